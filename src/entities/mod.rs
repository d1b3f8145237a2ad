// Entity Models - the records the admin screens work with
//
// Serde names follow the backend JSON (`ds_*` text, `nr_*` numbers/ids,
// `fl_*` flags, `tx_*` long text). Rust names are plain English.
// Search and sort address fields by the Rust names (see `Record` impls).

pub mod client;
pub mod contact;
pub mod user;

pub use client::{Address, Client, ClientContact, NewClient, CLIENT_SEARCH_FIELDS, CLIENT_SORT_FIELDS};
pub use contact::{ClientRef, Contact, NewContact, CONTACT_SEARCH_FIELDS, CONTACT_SORT_FIELDS, JOB_TITLES};
pub use user::{NewUser, Session, User, UserRole};

use crate::search::FieldValue;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub(crate) fn text(value: &Option<String>) -> FieldValue<'_> {
    match value {
        Some(s) => FieldValue::Text(s),
        None => FieldValue::Missing,
    }
}

pub(crate) fn number(value: Option<f64>) -> FieldValue<'static> {
    value.map(FieldValue::Number).unwrap_or(FieldValue::Missing)
}

/// Blank strings become `None`, everything else is trimmed
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Backend ids and codes arrive as either JSON strings or numbers
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn default_true() -> bool {
    true
}

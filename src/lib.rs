// CRM Admin - Core Library
// Exposes all modules for use in the terminal front end, dev server, and tests

pub mod formatters;  // Brazilian input masks (CNPJ, CEP, phone)
pub mod collation;   // Locale-aware string ordering
pub mod search;      // Filter + sort over record lists
pub mod entities;    // Clients, contacts, users
pub mod error;
pub mod config;
pub mod logging;
pub mod backend;     // Backend + AddressLookup traits
pub mod rest;        // HTTP implementations
pub mod db;          // Local SQLite store

#[cfg(feature = "server")]
pub mod server;      // Development REST server over the local store

// Re-export commonly used types
pub use formatters::{
    digits_only, display_phone, format_cep, format_cnpj, format_phone, Mask, MaskedInput,
};
pub use search::{
    filter_records, sort_records, FieldValue, FilterQuery, Record, SearchState, SortDirection,
    SortSpec,
};
pub use entities::{
    Address, Client, ClientContact, ClientRef, Contact, NewClient, NewContact, NewUser, Session,
    User, UserRole,
};
pub use error::{CrmError, CrmResult};
pub use config::Settings;
pub use backend::{AddressLookup, Backend};
pub use rest::{RestBackend, ViaCep};
pub use db::{Event, ImportReport, LocalBackend, Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

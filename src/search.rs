// 🔎 Search - filtering and sorting of record lists
//
// One implementation for every list in the app. Callers hand in records that
// implement `Record`, and get back a fresh Vec; the input is never touched.

use crate::collation;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// RECORD
// ============================================================================

/// A single field value as seen by the filter and the sorter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Bool(bool),
    Number(f64),
    Missing,
}

/// Anything that can be listed, searched and sorted
pub trait Record {
    /// `None` means the record has no active flag at all.
    /// Such records are never hidden by the inactive filter.
    fn active(&self) -> Option<bool>;

    /// Look up a field by name. Unknown names give `Missing`.
    fn field(&self, name: &str) -> FieldValue<'_>;
}

/// Raw backend JSON, keyed by the backend's own field names
impl Record for serde_json::Value {
    fn active(&self) -> Option<bool> {
        self.get("fl_ativo").and_then(|v| v.as_bool())
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match self.get(name) {
            Some(serde_json::Value::String(s)) => FieldValue::Text(s),
            Some(serde_json::Value::Bool(b)) => FieldValue::Bool(*b),
            Some(serde_json::Value::Number(n)) => n
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing),
            _ => FieldValue::Missing,
        }
    }
}

// ============================================================================
// FILTERING
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterQuery {
    /// Free text; blank means "no text filter"
    pub term: String,

    /// Fields the term is matched against
    pub fields: Vec<String>,

    pub include_inactive: bool,
}

impl FilterQuery {
    pub fn new(term: &str, fields: &[&str], include_inactive: bool) -> Self {
        Self {
            term: term.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            include_inactive,
        }
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        if !self.include_inactive && record.active() == Some(false) {
            return false;
        }

        if self.term.trim().is_empty() {
            return true;
        }

        let needle = self.term.to_lowercase();
        self.fields.iter().any(|name| match record.field(name) {
            FieldValue::Text(value) => value.to_lowercase().contains(&needle),
            _ => false,
        })
    }
}

/// Keep the records matching `query`, in their original order
pub fn filter_records<R: Record + Clone>(items: &[R], query: &FilterQuery) -> Vec<R> {
    items
        .iter()
        .filter(|item| query.matches(*item))
        .cloned()
        .collect()
}

// ============================================================================
// SORTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reversed(&self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Asc => "↑",
            SortDirection::Desc => "↓",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `field` or `field:asc` / `field:desc`
    pub fn parse(spec: &str) -> Option<Self> {
        let (field, direction) = match spec.split_once(':') {
            Some((field, dir)) => match dir.trim().to_lowercase().as_str() {
                "asc" => (field, SortDirection::Asc),
                "desc" => (field, SortDirection::Desc),
                _ => return None,
            },
            None => (spec, SortDirection::Asc),
        };

        let field = field.trim();
        if field.is_empty() {
            return None;
        }

        Some(Self {
            field: field.to_string(),
            direction,
        })
    }

    pub fn compare<R: Record>(&self, a: &R, b: &R) -> Ordering {
        let ord = compare_values(a.field(&self.field), b.field(&self.field));
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

/// Missing values sort as empty text. Values of different kinds compare equal.
fn compare_values(a: FieldValue<'_>, b: FieldValue<'_>) -> Ordering {
    let a = if a == FieldValue::Missing { FieldValue::Text("") } else { a };
    let b = if b == FieldValue::Missing { FieldValue::Text("") } else { b };

    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => collation::compare(x, y),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(&y),
        (FieldValue::Number(x), FieldValue::Number(y)) => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => Ordering::Equal,
    }
}

/// Sorted copy of `items`.
///
/// The relative order of records with equal keys is not part of the contract;
/// callers that care should add their own tie-breaker.
pub fn sort_records<R: Record + Clone>(items: &[R], spec: &SortSpec) -> Vec<R> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| spec.compare(a, b));
    sorted
}

// ============================================================================
// SEARCH STATE (what a list page keeps between keystrokes)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    pub term: String,
    pub show_inactive: bool,
    pub sort: Option<SortSpec>,
    fields: Vec<String>,
}

impl SearchState {
    pub fn new(fields: &[&str], show_inactive: bool) -> Self {
        Self {
            term: String::new(),
            show_inactive,
            sort: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_sort(mut self, spec: SortSpec) -> Self {
        self.sort = Some(spec);
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn query(&self) -> FilterQuery {
        FilterQuery {
            term: self.term.clone(),
            fields: self.fields.clone(),
            include_inactive: self.show_inactive,
        }
    }

    pub fn is_searching(&self) -> bool {
        !self.term.trim().is_empty()
    }

    pub fn toggle_inactive(&mut self) {
        self.show_inactive = !self.show_inactive;
    }

    /// Column-header behaviour: the same field flips direction,
    /// a different field starts ascending.
    pub fn toggle_sort(&mut self, field: &str) {
        self.sort = Some(match &self.sort {
            Some(current) if current.field == field => SortSpec {
                field: field.to_string(),
                direction: current.direction.reversed(),
            },
            _ => SortSpec::asc(field),
        });
    }

    /// Filter, then sort
    pub fn apply<R: Record + Clone>(&self, items: &[R]) -> Vec<R> {
        let filtered = filter_records(items, &self.query());
        match &self.sort {
            Some(spec) => sort_records(&filtered, spec),
            None => filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> Vec<serde_json::Value> {
        vec![
            json!({"ds_nome": "Ana", "fl_ativo": true}),
            json!({"ds_nome": "Bia", "fl_ativo": false}),
        ]
    }

    fn names(items: &[serde_json::Value]) -> Vec<&str> {
        items
            .iter()
            .map(|v| v["ds_nome"].as_str().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_hides_inactive_by_default() {
        let query = FilterQuery::new("", &["ds_nome"], false);
        let result = filter_records(&people(), &query);
        assert_eq!(names(&result), vec!["Ana"]);
    }

    #[test]
    fn test_case_insensitive_term_with_inactive() {
        let query = FilterQuery::new("b", &["ds_nome"], true);
        let result = filter_records(&people(), &query);
        assert_eq!(names(&result), vec!["Bia"]);
    }

    #[test]
    fn test_records_without_active_flag_always_pass() {
        let items = vec![
            json!({"ds_nome": "Sem flag"}),
            json!({"ds_nome": "Inativo", "fl_ativo": false}),
        ];
        let query = FilterQuery::new("", &["ds_nome"], false);
        assert_eq!(names(&filter_records(&items, &query)), vec!["Sem flag"]);
    }

    #[test]
    fn test_whitespace_term_is_no_filter() {
        let query = FilterQuery::new("   ", &["ds_nome"], true);
        assert_eq!(filter_records(&people(), &query).len(), 2);
    }

    #[test]
    fn test_non_text_fields_never_match() {
        let items = vec![json!({"ds_nome": "Ana", "nr_numero": 12, "fl_ativo": true})];
        let query = FilterQuery::new("12", &["nr_numero", "fl_ativo", "missing"], true);
        assert!(filter_records(&items, &query).is_empty());
    }

    #[test]
    fn test_empty_fields_with_term_matches_nothing() {
        let query = FilterQuery::new("ana", &[], true);
        assert!(filter_records(&people(), &query).is_empty());
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<serde_json::Value> = vec![];
        let query = FilterQuery::new("x", &["ds_nome"], false);
        assert!(filter_records(&items, &query).is_empty());
        assert!(sort_records(&items, &SortSpec::asc("ds_nome")).is_empty());
    }

    #[test]
    fn test_sort_locale_order() {
        let items = vec![
            json!({"ds_nome": "Bia"}),
            json!({"ds_nome": "ana"}),
            json!({"ds_nome": "Carlos"}),
        ];
        let sorted = sort_records(&items, &SortSpec::asc("ds_nome"));
        assert_eq!(names(&sorted), vec!["ana", "Bia", "Carlos"]);

        let sorted = sort_records(&items, &SortSpec::desc("ds_nome"));
        assert_eq!(names(&sorted), vec!["Carlos", "Bia", "ana"]);

        // Source untouched
        assert_eq!(names(&items), vec!["Bia", "ana", "Carlos"]);
    }

    #[test]
    fn test_sort_booleans_numerically() {
        let items = vec![
            json!({"ds_nome": "A", "fl_ativo": true}),
            json!({"ds_nome": "B", "fl_ativo": false}),
        ];
        let sorted = sort_records(&items, &SortSpec::asc("fl_ativo"));
        assert_eq!(names(&sorted), vec!["B", "A"]);

        let sorted = sort_records(&items, &SortSpec::desc("fl_ativo"));
        assert_eq!(names(&sorted), vec!["A", "B"]);
    }

    #[test]
    fn test_missing_sorts_as_empty_text() {
        let items = vec![json!({"ds_nome": "Ana"}), json!({"outro": 1})];
        let sorted = sort_records(&items, &SortSpec::asc("ds_nome"));
        assert!(sorted[0].get("ds_nome").is_none());
    }

    #[test]
    fn test_sort_spec_parse() {
        assert_eq!(SortSpec::parse("name"), Some(SortSpec::asc("name")));
        assert_eq!(SortSpec::parse("name:desc"), Some(SortSpec::desc("name")));
        assert_eq!(SortSpec::parse("name:DESC"), Some(SortSpec::desc("name")));
        assert_eq!(SortSpec::parse("name:sideways"), None);
        assert_eq!(SortSpec::parse(":asc"), None);
    }

    #[test]
    fn test_toggle_sort_like_column_headers() {
        let mut state = SearchState::new(&["ds_nome"], false);
        state.toggle_sort("ds_nome");
        assert_eq!(state.sort, Some(SortSpec::asc("ds_nome")));

        state.toggle_sort("ds_nome");
        assert_eq!(state.sort, Some(SortSpec::desc("ds_nome")));

        state.toggle_sort("ds_email");
        assert_eq!(state.sort, Some(SortSpec::asc("ds_email")));
    }

    #[test]
    fn test_search_state_apply_filters_then_sorts() {
        let items = vec![
            json!({"ds_nome": "Carla", "fl_ativo": true}),
            json!({"ds_nome": "Bia", "fl_ativo": false}),
            json!({"ds_nome": "Ana", "fl_ativo": true}),
        ];
        let mut state = SearchState::new(&["ds_nome"], false).with_sort(SortSpec::asc("ds_nome"));
        assert_eq!(names(&state.apply(&items)), vec!["Ana", "Carla"]);

        state.toggle_inactive();
        state.term = "a".to_string();
        assert!(state.is_searching());
        assert_eq!(names(&state.apply(&items)), vec!["Ana", "Bia", "Carla"]);
    }
}

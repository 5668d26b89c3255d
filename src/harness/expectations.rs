//! Expectation files
//!
//! ```json
//! { "checks": [
//!     { "match": "echo", "hasAny": ["source.bash"], "note": "inside the block" },
//!     { "afterMatch": "'';", "notHasAny": ["source.bash"] }
//! ] }
//! ```
//!
//! Checks are read leniently so one badly written check cannot take the
//! others down with it. A text field of the wrong type counts as absent. A
//! line number that is not a non-negative integer, or a scope list that is not
//! a list of strings, is kept as [`Field::Invalid`] and fails only its own
//! check.

use super::loader::read_document;
use crate::error::HarnessError;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::Path;

/// A check field that may be missing, usable, or present but unusable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Field<T> {
    #[default]
    Absent,
    Value(T),
    /// The offending value, as JSON
    Invalid(String),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }
}

/// One declarative assertion about the scopes of a single line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Check {
    /// First line containing this text
    pub match_: Option<String>,
    /// 1-based line number
    pub line: Field<usize>,
    /// First non-blank line after the first line containing this text
    pub after_match: Option<String>,
    /// First non-blank line after this 1-based line number
    pub after_line: Field<usize>,
    pub has_any: Field<Vec<String>>,
    pub not_has_any: Field<Vec<String>>,
    pub note: Option<String>,
}

impl Check {
    /// Build a check from any JSON value. Never fails; a non-object simply
    /// has no usable fields.
    pub fn from_value(value: &Value) -> Self {
        let empty = Map::new();
        let object = value.as_object().unwrap_or(&empty);
        Check {
            match_: text(object, "match"),
            line: line_number(object, "line"),
            after_match: text(object, "afterMatch"),
            after_line: line_number(object, "afterLine"),
            has_any: scope_list(object, "hasAny"),
            not_has_any: scope_list(object, "notHasAny"),
            note: text(object, "note"),
        }
    }
}

impl<'de> Deserialize<'de> for Check {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|value| Check::from_value(&value))
    }
}

fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key)?.as_str().map(str::to_string)
}

fn line_number(object: &Map<String, Value>, key: &str) -> Field<usize> {
    match object.get(key) {
        Some(Value::Number(number)) => number
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map_or_else(|| Field::Invalid(number.to_string()), Field::Value),
        _ => Field::Absent,
    }
}

fn scope_list(object: &Map<String, Value>, key: &str) -> Field<Vec<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Field::Absent,
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map_or_else(|| Field::Invalid(Value::Array(items.clone()).to_string()), Field::Value),
        Some(other) => Field::Invalid(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ExpectationFile {
    #[serde(default)]
    checks: Value,
}

/// Read the checks of an expectation file. An absent, empty or non-list
/// `checks` is fatal.
pub fn load_checks(path: &Path) -> Result<Vec<Check>, HarnessError> {
    let file: ExpectationFile = read_document(path)?;
    match file.checks {
        Value::Array(items) if !items.is_empty() => Ok(items.iter().map(Check::from_value).collect()),
        _ => Err(HarnessError::NoChecks(path.to_path_buf())),
    }
}

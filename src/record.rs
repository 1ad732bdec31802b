//! # Record Value Model
//!
//! Records are maps of dynamically-typed values. Values are a tagged
//! variant with total conversions to and from `serde_json::Value`; the
//! `Date` variant only arises in memory (timestamps the store stamps, or
//! caller-constructed instants) and is written to the wire as an RFC3339
//! string. Deserialization therefore never produces `Date` -- a stored
//! timestamp reloads as `String`, and the `date` field type accepts both.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A record: field name to dynamically-typed value.
///
/// `BTreeMap` keeps serialized output deterministic.
pub type Record = BTreeMap<String, Value>;

/// Dynamically-typed record value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the variant name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Returns the string content if this is a `String` value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Textual form used by the relational backend when comparing against
    /// the `->>` projection of the payload: strings compare as their raw
    /// text, everything else as its JSON text.
    pub fn to_text(&self) -> String {
        match serde_json::Value::from(self.clone()) {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Date(instant) => {
                serde_json::Value::String(instant.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(entries) => serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(instant: DateTime<Utc>) -> Self {
        Value::Date(instant)
    }
}

/// A record matches a filter when every filter key is present in the
/// record with an exactly equal value. A missing key excludes the record.
pub fn matches_filter(record: &Record, filter: &Record) -> bool {
    filter
        .iter()
        .all(|(key, value)| record.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_json_roundtrip_preserves_structure() {
        let json: serde_json::Value = serde_json::json!({
            "name": "Alice",
            "age": 30,
            "score": 99.5,
            "active": true,
            "tags": ["a", "b"],
            "address": { "city": "Berlin" },
            "note": null
        });
        let value = Value::from(json.clone());
        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn test_date_serializes_as_rfc3339_string() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let json = serde_json::Value::from(Value::Date(instant));
        let text = json.as_str().unwrap();
        assert!(text.starts_with("2024-03-01T12:00:00"));
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok());
    }

    #[test]
    fn test_deserialization_never_produces_date() {
        let value = Value::from(serde_json::json!("2024-03-01T12:00:00Z"));
        assert_eq!(value.type_name(), "string");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(true).type_name(), "boolean");
        assert_eq!(Value::from(1i64).type_name(), "number");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::Array(vec![]).type_name(), "array");
        assert_eq!(Value::Object(BTreeMap::new()).type_name(), "object");
    }

    #[test]
    fn test_to_text_strips_string_quotes() {
        assert_eq!(Value::from("pending").to_text(), "pending");
        assert_eq!(Value::from(5i64).to_text(), "5");
        assert_eq!(Value::from(true).to_text(), "true");
        assert_eq!(Value::Null.to_text(), "null");
    }

    #[test]
    fn test_matches_filter_exact_equality() {
        let mut record = Record::new();
        record.insert("status".into(), Value::from("pending"));
        record.insert("count".into(), Value::from(3i64));

        let mut filter = Record::new();
        filter.insert("status".into(), Value::from("pending"));
        assert!(matches_filter(&record, &filter));

        filter.insert("count".into(), Value::from(4i64));
        assert!(!matches_filter(&record, &filter));
    }

    #[test]
    fn test_matches_filter_missing_key_excludes() {
        let record = Record::new();
        let mut filter = Record::new();
        filter.insert("status".into(), Value::from("pending"));
        assert!(!matches_filter(&record, &filter));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let mut record = Record::new();
        record.insert("any".into(), Value::Null);
        assert!(matches_filter(&record, &Record::new()));
    }
}

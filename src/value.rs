//! Dynamically-typed record values.
//!
//! Request bodies carry arbitrarily-shaped field maps. Rather than passing an
//! untyped JSON blob through the pipeline, values are modeled as a tagged
//! union so binding code can match exhaustively. Field order inside a record
//! is preserved (masters and subreports consume fields positionally in some
//! engines), hence [`IndexMap`] rather than a hash map.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One data record: an ordered mapping from field name to value.
pub type Record = IndexMap<String, FieldValue>;

/// A dynamically-typed field value.
///
/// Mirrors the JSON data model. `Null` must stay the first variant: the
/// untagged deserializer tries variants in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent/null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value (integers are widened to f64, as in JSON).
    Number(f64),
    /// Text value.
    String(String),
    /// Ordered sequence of values.
    Sequence(Vec<FieldValue>),
    /// Nested record.
    Record(Record),
}

impl FieldValue {
    /// Whether this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the value as a number, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow the value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the value as a sequence, if it is one.
    pub fn as_sequence(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the value as a nested record, if it is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FieldValue::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(items) => {
                FieldValue::Sequence(items.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Record(
                map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect(),
            ),
        }
    }
}

/// Convert a JSON object into a [`Record`], or `None` for any other shape.
pub fn record_from_json(value: &serde_json::Value) -> Option<Record> {
    match FieldValue::from(value.clone()) {
        FieldValue::Record(record) => Some(record),
        _ => None,
    }
}

//! Composition requests and template keys.
//!
//! A request is an ordered mapping from template key to a sequence of data
//! records, plus any top-level scalar/record fields passed straight through
//! to the master template. Key order is semantically significant: subreport
//! jobs are consumed positionally by the rendering engine, so the caller's
//! iteration order must survive all the way to the fill call.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::value::{FieldValue, Record};

/// The distinguished key of the top-level template that embeds all
/// subreport jobs. Always resolved, whether or not it appears in the
/// request's data keys.
pub const MASTER_KEY: &str = "master";

/// A normalized template identifier.
///
/// Keys are trimmed and lower-cased on construction; two raw keys that
/// normalize identically refer to the same template resource and are
/// compiled exactly once per composition run. The normalized form doubles
/// as the resource-path suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct TemplateKey(String);

impl TemplateKey {
    /// Normalize a raw identifier into a key.
    pub fn new(raw: &str) -> Self {
        TemplateKey(raw.trim().to_lowercase())
    }

    /// The normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the distinguished master key.
    pub fn is_master(&self) -> bool {
        self.0 == MASTER_KEY
    }

    /// The master key.
    pub fn master() -> Self {
        TemplateKey(MASTER_KEY.to_string())
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TemplateKey {
    fn from(raw: String) -> Self {
        TemplateKey::new(&raw)
    }
}

impl From<&str> for TemplateKey {
    fn from(raw: &str) -> Self {
        TemplateKey::new(raw)
    }
}

/// A composition request: ordered datasets keyed by template, plus
/// top-level fields for direct master-template access.
///
/// Parsed from a JSON object. Each entry whose value is an array of objects
/// becomes a dataset; every other entry (scalar, object, null, or an array
/// of non-objects) becomes a pass-through field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionRequest {
    datasets: IndexMap<TemplateKey, Vec<Record>>,
    fields: IndexMap<String, FieldValue>,
}

impl CompositionRequest {
    /// Create an empty request (useful with the builder methods below).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset under `key`, appending to any records already mapped
    /// to the same normalized key.
    pub fn with_dataset(mut self, key: impl Into<TemplateKey>, records: Vec<Record>) -> Self {
        self.datasets.entry(key.into()).or_default().extend(records);
        self
    }

    /// Add a top-level pass-through field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Parse a request from a JSON value.
    ///
    /// Fails with [`Error::InvalidRequest`] if the body is not an object.
    pub fn from_value(body: &serde_json::Value) -> Result<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::InvalidRequest("request body must be a JSON object".to_string()))?;

        let mut request = CompositionRequest::new();
        for (name, value) in object {
            match dataset_records(value) {
                Some(records) => {
                    request
                        .datasets
                        .entry(TemplateKey::new(name))
                        .or_default()
                        .extend(records);
                }
                None => {
                    request
                        .fields
                        .insert(name.clone(), FieldValue::from(value.clone()));
                }
            }
        }
        Ok(request)
    }

    /// Ordered datasets, in caller key order.
    pub fn datasets(&self) -> &IndexMap<TemplateKey, Vec<Record>> {
        &self.datasets
    }

    /// Records mapped to `key`, if the dataset exists.
    pub fn dataset(&self, key: &TemplateKey) -> Option<&[Record]> {
        self.datasets.get(key).map(Vec::as_slice)
    }

    /// Top-level pass-through fields.
    pub fn fields(&self) -> &IndexMap<String, FieldValue> {
        &self.fields
    }

    /// Total record count across all datasets.
    pub fn record_count(&self) -> usize {
        self.datasets.values().map(Vec::len).sum()
    }

    /// Whether the request carries no datasets and no fields.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty() && self.fields.is_empty()
    }
}

/// Interpret a JSON value as a sequence of records, or `None` if it is
/// anything else. An empty array counts as an empty dataset.
fn dataset_records(value: &serde_json::Value) -> Option<Vec<Record>> {
    let items = value.as_array()?;
    items
        .iter()
        .map(crate::value::record_from_json)
        .collect::<Option<Vec<Record>>>()
}

impl<'de> Deserialize<'de> for CompositionRequest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let body = serde_json::Value::deserialize(deserializer)?;
        CompositionRequest::from_value(&body).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_normalization() {
        assert_eq!(TemplateKey::new("  Relative "), TemplateKey::new("relative"));
        assert_eq!(TemplateKey::new("MASTER").as_str(), "master");
        assert!(TemplateKey::new(" Master ").is_master());
    }

    #[test]
    fn test_datasets_and_fields_split() {
        let request = CompositionRequest::from_value(&json!({
            "master": [],
            "Relative": [{"name": "R1"}, {"name": "R2"}],
            "title": "Annual report",
            "issued": {"year": 2026},
            "tags": ["a", "b"]
        }))
        .unwrap();

        let keys: Vec<&str> = request.datasets().keys().map(TemplateKey::as_str).collect();
        assert_eq!(keys, vec!["master", "relative"]);
        assert_eq!(request.record_count(), 2);

        // Scalars, objects, and non-record arrays pass through as fields.
        let names: Vec<&str> = request.fields().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["title", "issued", "tags"]);
    }

    #[test]
    fn test_duplicate_normalized_keys_merge() {
        let request = CompositionRequest::new()
            .with_dataset("Relative", vec![Record::new()])
            .with_dataset(" relative ", vec![Record::new()]);
        assert_eq!(request.datasets().len(), 1);
        assert_eq!(request.record_count(), 2);
    }

    #[test]
    fn test_empty_request() {
        let request = CompositionRequest::from_value(&json!({})).unwrap();
        assert!(request.is_empty());

        let err = CompositionRequest::from_value(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_deserialize_from_str() {
        let request: CompositionRequest =
            serde_json::from_str(r#"{"master": [{"a": 1}]}"#).unwrap();
        assert_eq!(request.dataset(&TemplateKey::master()).map(<[_]>::len), Some(1));
    }
}

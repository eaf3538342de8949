//! Traffic record submitted for classification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single field value as it arrives from the submission form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    /// Checkbox-style indicator; reads as 1 or 0
    Flag(bool),
    /// Field present but left blank
    Null,
    /// Arrays and objects. Kept so one odd field does not sink the record.
    Other(serde_json::Value),
}

impl FieldValue {
    /// True for `null` and blank strings.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(_) | FieldValue::Flag(_) | FieldValue::Other(_) => false,
        }
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
        FieldValue::Flag(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Raw connection record: field name to value. Fields the target model
/// does not read are ignored by the encoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl TrafficRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Get the raw value of a field
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Numeric value of a field, if present and numeric. Numeric text is
    /// parsed and flags read as 1 or 0.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Null | FieldValue::Other(_) => None,
        }
    }

    /// Text value of a field, if present and textual.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Number of fields, including ones no model reads
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Message envelope carrying a record over the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSubmission {
    /// Caller-supplied identifier echoed back in the verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(flatten)]
    pub record: TrafficRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deserialization() {
        let json = r#"{"protocol_type": "tcp", "count": 10, "same_srv_rate": 1.0, "flag": null}"#;
        let record: TrafficRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.len(), 4);
        assert_eq!(record.text("protocol_type"), Some("tcp"));
        assert_eq!(record.number("count"), Some(10.0));
        assert_eq!(record.get("flag"), Some(&FieldValue::Null));
        assert!(record.get("flag").unwrap().is_empty());
    }

    #[test]
    fn test_numeric_text_is_parsed() {
        let record = TrafficRecord::new().with("src_bytes", " 512 ").with("service", "http");
        assert_eq!(record.number("src_bytes"), Some(512.0));
        assert_eq!(record.number("service"), None);
    }

    #[test]
    fn test_submission_envelope() {
        let json = r#"{"record_id": "r-1", "service": "http", "count": 3}"#;
        let submission: RecordSubmission = serde_json::from_str(json).unwrap();

        assert_eq!(submission.record_id.as_deref(), Some("r-1"));
        assert_eq!(submission.record.len(), 2);
        assert!(submission.record.get("record_id").is_none());

        let anonymous: RecordSubmission = serde_json::from_str(r#"{"count": 3}"#).unwrap();
        assert!(anonymous.record_id.is_none());
    }

    #[test]
    fn test_nested_and_boolean_values_decode() {
        let json = r#"{
            "record_id": "r-2",
            "service": "http",
            "logged_in": true,
            "land": false,
            "meta": {"ui": "form"},
            "tags": [1, 2]
        }"#;
        let submission: RecordSubmission = serde_json::from_str(json).unwrap();
        let record = submission.record;

        assert_eq!(submission.record_id.as_deref(), Some("r-2"));
        assert_eq!(record.len(), 5);
        assert_eq!(record.number("logged_in"), Some(1.0));
        assert_eq!(record.number("land"), Some(0.0));
        assert_eq!(record.number("meta"), None);
        assert_eq!(record.text("meta"), None);
        assert!(matches!(record.get("tags"), Some(FieldValue::Other(_))));
        assert!(!record.get("meta").unwrap().is_empty());
    }
}

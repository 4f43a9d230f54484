//! Document representation for the document store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::adapter::{Record, DOCUMENT_ID};

/// A stored document: caller properties plus the id and a modification stamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    #[serde(rename = "_modified_at")]
    pub modified_at: DateTime<Utc>,

    #[serde(flatten)]
    pub data: Record,
}

impl Document {
    /// Build a document from a caller record, generating a uuid v4 id when absent
    pub fn from_record(mut record: Record) -> Self {
        let id = match record.remove(DOCUMENT_ID) {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        Self::with_id(id, record)
    }

    pub fn with_id(id: String, mut data: Record) -> Self {
        data.remove(DOCUMENT_ID);
        data.retain(|k, _| !k.starts_with('_'));
        Self {
            id,
            modified_at: Utc::now(),
            data,
        }
    }

    /// Shallow-merge properties over the current ones
    pub fn merge(&mut self, data: Record) {
        for (k, v) in data {
            if k != DOCUMENT_ID && !k.starts_with('_') {
                self.data.insert(k, v);
            }
        }
        self.modified_at = Utc::now();
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// The caller-facing record: `id` followed by the properties
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(DOCUMENT_ID.into(), Value::String(self.id.clone()));
        record.extend(self.data.clone());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_document_creation() {
        let doc = Document::from_record(record(json!({"name": "test", "value": 42})));
        assert!(uuid::Uuid::parse_str(&doc.id).is_ok());
        assert_eq!(doc.get("name"), Some(&json!("test")));

        let doc = Document::from_record(record(json!({"id": "a", "_rid": "x", "v": 1})));
        assert_eq!(doc.id, "a");
        assert_eq!(Value::Object(doc.to_record()), json!({"id": "a", "v": 1}));
    }

    #[test]
    fn test_document_merge() {
        let mut doc = Document::from_record(record(json!({"id": "a", "x": 1, "y": 2})));
        doc.merge(record(json!({"id": "b", "y": 3, "z": 4})));
        assert_eq!(doc.id, "a");
        assert_eq!(Value::Object(doc.to_record()), json!({"id": "a", "x": 1, "y": 3, "z": 4}));
    }

    #[test]
    fn test_document_serialization() {
        let doc = Document::from_record(record(json!({"id": "a", "v": 1})));
        let text = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, "a");
        assert_eq!(back.get("v"), Some(&json!(1)));
        assert!(back.get("_modified_at").is_none());
    }
}

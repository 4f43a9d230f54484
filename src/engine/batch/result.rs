//! Batch results, field selection and the response envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::engine::adapter::{BackendKind, Record};
use crate::engine::error::BatchContext;

/// Lifecycle of one batch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    #[default]
    Idle,
    Collecting,
    Committing,
    Committed,
    RolledBack,
    Failed,
}

/// Which fields a caller wants back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    /// Identifier fields only
    #[default]
    IdsOnly,
    All,
    Only(Vec<String>),
}

impl FieldSelection {
    /// `None` or empty selects identifiers, `*` selects everything,
    /// otherwise a comma separated list
    pub fn parse(fields: Option<&str>) -> Self {
        match fields.map(str::trim) {
            None | Some("") => FieldSelection::IdsOnly,
            Some("*") => FieldSelection::All,
            Some(list) => FieldSelection::Only(
                list.split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
            ),
        }
    }

    /// Column list for a native projection; `None` means every column
    pub fn projection(&self, kind: BackendKind) -> Option<Vec<String>> {
        let ids = kind.identifier_fields().iter().map(|f| f.to_string());
        match self {
            FieldSelection::All => None,
            FieldSelection::IdsOnly => Some(ids.collect()),
            FieldSelection::Only(fields) => {
                let mut columns: Vec<String> = fields.clone();
                for id in ids {
                    if !columns.contains(&id) {
                        columns.push(id);
                    }
                }
                Some(columns)
            }
        }
    }

    /// Reduce a record to the selection; identifier fields always survive
    pub fn clean(&self, record: Record, kind: BackendKind) -> Record {
        match self {
            FieldSelection::All => record,
            FieldSelection::IdsOnly => record
                .into_iter()
                .filter(|(k, _)| kind.identifier_fields().contains(&k.as_str()))
                .collect(),
            FieldSelection::Only(fields) => record
                .into_iter()
                .filter(|(k, _)| {
                    kind.identifier_fields().contains(&k.as_str()) || fields.iter().any(|f| f == k)
                })
                .collect(),
        }
    }
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemOutcome {
    Record(Record),
    Failed(String),
}

impl From<ItemOutcome> for Value {
    fn from(outcome: ItemOutcome) -> Self {
        match outcome {
            ItemOutcome::Record(record) => Value::Object(record),
            ItemOutcome::Failed(message) => Value::String(message),
        }
    }
}

/// Per-index outcomes of a batch, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub by_index: BTreeMap<usize, ItemOutcome>,
    pub failed_indices: Vec<usize>,
    pub partial: bool,
}

impl ExecutionResult {
    pub fn record(&mut self, index: usize, record: Record) {
        self.by_index.insert(index, ItemOutcome::Record(record));
    }

    pub fn fail(&mut self, index: usize, message: impl Into<String>) {
        self.by_index.insert(index, ItemOutcome::Failed(message.into()));
        if !self.failed_indices.contains(&index) {
            self.failed_indices.push(index);
            self.failed_indices.sort_unstable();
        }
        self.partial = true;
    }

    /// Successful records in input order
    pub fn records(&self) -> Vec<Record> {
        self.by_index
            .values()
            .filter_map(|outcome| match outcome {
                ItemOutcome::Record(record) => Some(record.clone()),
                ItemOutcome::Failed(_) => None,
            })
            .collect()
    }

    pub fn outcome(&self, index: usize) -> Option<&ItemOutcome> {
        self.by_index.get(&index)
    }

    pub fn context(&self) -> BatchContext {
        BatchContext {
            error: self.failed_indices.clone(),
            resource: self.by_index.values().cloned().map(Value::from).collect(),
        }
    }

    pub fn envelope(&self) -> ResultEnvelope {
        if self.partial {
            let context = self.context();
            ResultEnvelope {
                resource: context.resource,
                error: Some(context.error),
                meta: None,
            }
        } else {
            ResultEnvelope::from_records(self.records())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub count: usize,
}

/// `{resource, error?, meta?}` as returned to callers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultEnvelope {
    pub resource: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl ResultEnvelope {
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            resource: records.into_iter().map(Value::Object).collect(),
            error: None,
            meta: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.meta = Some(Meta { count });
        self
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
    fn test_field_selection() {
        let entity = record(json!({"PartitionKey": "p", "RowKey": "1", "name": "a", "age": 3}));
        assert_eq!(
            Value::Object(FieldSelection::parse(None).clean(entity.clone(), BackendKind::Table)),
            json!({"PartitionKey": "p", "RowKey": "1"})
        );
        assert_eq!(
            Value::Object(FieldSelection::parse(Some("name")).clean(entity.clone(), BackendKind::Table)),
            json!({"PartitionKey": "p", "RowKey": "1", "name": "a"})
        );
        assert_eq!(FieldSelection::parse(Some("*")).clean(entity.clone(), BackendKind::Table), entity);
        assert_eq!(
            FieldSelection::parse(Some("name, age")).projection(BackendKind::Document),
            Some(vec!["name".to_string(), "age".to_string(), "id".to_string()])
        );
        assert_eq!(FieldSelection::All.projection(BackendKind::Document), None);
    }

    #[test]
    fn test_partial_envelope() {
        let mut result = ExecutionResult::default();
        result.record(0, record(json!({"id": "a"})));
        result.fail(1, "boom");
        result.record(2, record(json!({"id": "c"})));

        assert!(result.partial);
        assert_eq!(result.failed_indices, vec![1]);
        assert_eq!(result.records().len(), 2);
        assert_eq!(
            serde_json::to_value(result.envelope()).unwrap(),
            json!({"resource": [{"id": "a"}, "boom", {"id": "c"}], "error": [1]})
        );
    }

    #[test]
    fn test_clean_envelope_with_count() {
        let envelope = ResultEnvelope::from_records(vec![record(json!({"id": "a"}))]).with_count(7);
        assert_eq!(
            serde_json::to_value(envelope).unwrap(),
            json!({"resource": [{"id": "a"}], "meta": {"count": 7}})
        );
    }
}

//! Batch Executor
//!
//! Runs a list of same-verb record operations against one table under one of
//! three error policies:
//! - fail-fast: stop at the first failure, reporting what was already applied
//! - continue: attempt every item, reporting failures per index
//! - rollback: stop at the first failure and undo what was applied
//!
//! Rollback on a backend with native atomic batches, where every item shares
//! one partition, is delegated to the backend instead of compensated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::result::{BatchState, ExecutionResult, FieldSelection};
use super::rollback::{RollbackEntry, RollbackLog};
use crate::engine::adapter::{
    Backend, BackendError, BackendKind, NativeQuery, NativeWrite, Record, RecordKey, PARTITION_KEY,
    ROW_KEY, TIMESTAMP,
};
use crate::engine::error::{ConnectorError, Result};
use crate::engine::filter::{FieldMap, Params, PartitionedFilterCompiler, DEFAULT_MAX_IDS_PER_FILTER};

pub const DEFAULT_MAX_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Replace,
    Patch,
    Delete,
    Get,
}

impl Verb {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" | "post" | "insert" => Some(Verb::Create),
            "replace" | "put" | "update" => Some(Verb::Replace),
            "patch" | "merge" => Some(Verb::Patch),
            "delete" => Some(Verb::Delete),
            "get" | "read" | "retrieve" => Some(Verb::Get),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Verb::Get)
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Verb::Create => "Not all requested records could be created.",
            Verb::Replace | Verb::Patch => "Not all requested records could be updated.",
            Verb::Delete => "Not all requested records could be deleted.",
            Verb::Get => "Not all requested records could be retrieved.",
        }
    }
}

/// One item of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOperation {
    pub index: usize,
    pub verb: Verb,
    /// Explicit address; otherwise taken from the record
    pub key: Option<RecordKey>,
    pub record: Option<Record>,
}

impl BatchOperation {
    pub fn from_records(verb: Verb, records: Vec<Record>) -> Vec<Self> {
        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| Self {
                index,
                verb,
                key: None,
                record: Some(record),
            })
            .collect()
    }

    /// One operation per key, each carrying a copy of `record` when given
    pub fn from_keys(verb: Verb, keys: Vec<RecordKey>, record: Option<&Record>) -> Vec<Self> {
        keys.into_iter()
            .enumerate()
            .map(|(index, key)| Self {
                index,
                verb,
                key: Some(key),
                record: record.cloned(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub rollback: bool,
    pub continue_on_error: bool,
    pub fields: FieldSelection,
    /// Applied to every entity that does not name its own partition
    pub partition_key: Option<String>,
}

/// A validated operation ready to send
#[derive(Debug)]
struct Prepared {
    index: usize,
    verb: Verb,
    key: Option<RecordKey>,
    record: Record,
}

impl Prepared {
    fn key(&self) -> Result<&RecordKey> {
        self.key
            .as_ref()
            .ok_or_else(|| ConnectorError::MissingIdentifier(format!("no identifier for item {}", self.index)))
    }
}

struct Run {
    verb: Verb,
    /// Pre-images fetched up front by row key, for multi-key entity deletes
    images: Option<HashMap<String, Record>>,
    total: usize,
    rollback: bool,
    continue_on_error: bool,
    result: ExecutionResult,
    log: RollbackLog,
}

pub struct BatchExecutor<'b, B: Backend + ?Sized> {
    backend: &'b B,
    table: String,
    options: BatchOptions,
    upsert_allowed: bool,
    max_batch: usize,
    max_ids_per_filter: usize,
    state: BatchState,
}

impl<'b, B: Backend + ?Sized> BatchExecutor<'b, B> {
    pub fn new(backend: &'b B, table: &str, options: BatchOptions) -> Self {
        Self {
            backend,
            table: table.to_string(),
            options,
            upsert_allowed: false,
            max_batch: DEFAULT_MAX_BATCH,
            max_ids_per_filter: DEFAULT_MAX_IDS_PER_FILTER,
            state: BatchState::Idle,
        }
    }

    /// Let replace create records that do not exist yet
    pub fn with_upsert(mut self, upsert_allowed: bool) -> Self {
        self.upsert_allowed = upsert_allowed;
        self
    }

    pub fn with_limits(mut self, max_batch: usize, max_ids_per_filter: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self.max_ids_per_filter = max_ids_per_filter;
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn execute(&mut self, ops: Vec<BatchOperation>) -> Result<ExecutionResult> {
        let total = ops.len();
        let verb = match ops.first() {
            Some(op) => op.verb,
            None => return Err(ConnectorError::BadRequest("No records in request.".to_string())),
        };

        // single items always behave as a plain call
        let (rollback, continue_on_error) = if total == 1 {
            (false, false)
        } else {
            (self.options.rollback, self.options.continue_on_error)
        };
        if rollback && continue_on_error {
            return Err(ConnectorError::ConfigConflict);
        }

        self.state = BatchState::Collecting;
        tracing::debug!(
            table = %self.table,
            verb = ?verb,
            items = total,
            rollback,
            continue_on_error,
            "starting batch"
        );

        let mut run = Run {
            verb,
            images: None,
            total,
            rollback,
            continue_on_error,
            result: ExecutionResult::default(),
            log: RollbackLog::new(),
        };
        let prepared: Vec<(usize, Result<Prepared>)> = ops
            .into_iter()
            .map(|op| (op.index, self.prepare(op)))
            .collect();

        if rollback && self.backend.supports_atomic_batch() && total <= self.max_batch {
            if let Some(partition_key) = shared_partition(&prepared, true) {
                return self.execute_atomic(run, prepared, &partition_key);
            }
        }
        if matches!(verb, Verb::Get | Verb::Delete) && self.kind() == BackendKind::Table && total > 1 {
            if let Some(partition_key) = shared_partition(&prepared, false) {
                if verb == Verb::Get {
                    return self.execute_id_reads(run, prepared, &partition_key);
                }
                run.images = Some(self.fetch_by_row_keys(&prepared_items(&prepared), &partition_key)?);
            }
        }

        for (index, item) in prepared {
            let outcome = match item {
                Ok(item) => {
                    let log = if run.rollback { Some(&mut run.log) } else { None };
                    self.apply(item, run.images.as_ref(), log)
                }
                Err(err) => Err(err),
            };
            self.settle(&mut run, index, outcome)?;
        }
        Ok(self.commit(run))
    }

    /// Validate one operation and normalize its record; nothing here touches the backend
    fn prepare(&self, op: BatchOperation) -> Result<Prepared> {
        let kind = self.kind();
        let partition_key = self.options.partition_key.as_deref();
        let mut record = op.record.unwrap_or_default();
        if kind == BackendKind::Table {
            record.remove(TIMESTAMP);
        }

        if matches!(op.verb, Verb::Create | Verb::Replace | Verb::Patch) && record.is_empty() {
            return Err(ConnectorError::BadRequest("No record in request.".to_string()));
        }
        if kind == BackendKind::Table && !record.is_empty() {
            if let Some(pk) = partition_key {
                record.insert(PARTITION_KEY.to_string(), Value::String(pk.to_string()));
            }
        }

        let key = match op.key {
            Some(key) => Ok(key),
            None => kind.key_of(&record, partition_key),
        };
        let key = match (op.verb, key) {
            (_, Ok(key)) => Some(key),
            // documents get a generated id on insert
            (Verb::Create, Err(_)) if kind == BackendKind::Document => None,
            (_, Err(reason)) => return Err(ConnectorError::MissingIdentifier(reason)),
        };

        if let Some(key) = &key {
            if op.verb.is_write() && op.verb != Verb::Delete {
                record.extend(key.to_record());
            }
        }

        Ok(Prepared {
            index: op.index,
            verb: op.verb,
            key,
            record,
        })
    }

    fn pre_image(&self, key: &RecordKey) -> Result<Option<Record>> {
        match self.backend.get(&self.table, key) {
            Ok(record) => Ok(Some(record)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn apply(
        &self,
        item: Prepared,
        images: Option<&HashMap<String, Record>>,
        log: Option<&mut RollbackLog>,
    ) -> Result<Record> {
        let table = self.table.as_str();
        match item.verb {
            Verb::Get => Ok(self.backend.get(table, item.key()?)?),
            Verb::Create => {
                let created = self.backend.insert(table, item.record)?;
                if let Some(log) = log {
                    if let Ok(key) = self.kind().key_of(&created, None) {
                        log.record(RollbackEntry::new(Verb::Create, key, None));
                    }
                }
                Ok(created)
            }
            Verb::Replace | Verb::Patch | Verb::Delete => {
                let key = item.key()?.clone();
                let wants_image = log.is_some()
                    || (item.verb == Verb::Delete && self.options.fields != FieldSelection::IdsOnly);
                let prior = match images {
                    Some(images) => match row_key_of(&key).and_then(|rk| images.get(rk)) {
                        Some(image) => Some(image.clone()),
                        None => {
                            return Err(ConnectorError::NotFound(format!(
                                "Record with identifier '{}' not found.",
                                key
                            )))
                        }
                    },
                    None if wants_image => self.pre_image(&key)?,
                    None => None,
                };

                let creates = item.verb == Verb::Replace && self.upsert_allowed;
                let log = match log {
                    Some(log) if prior.is_some() || creates => {
                        log.record(RollbackEntry::new(item.verb, key.clone(), prior.clone()));
                        Some(log)
                    }
                    _ => None,
                };

                let outcome = match item.verb {
                    Verb::Replace if creates => self.backend.upsert(table, &key, item.record),
                    Verb::Replace => self.backend.replace(table, &key, item.record),
                    Verb::Patch => self.backend.merge(table, &key, item.record),
                    _ => self
                        .backend
                        .delete(table, &key)
                        .map(|_| prior.unwrap_or_else(|| key.to_record())),
                };
                outcome.map_err(|err| {
                    if let Some(log) = log {
                        log.discard_last();
                    }
                    ConnectorError::from(err)
                })
            }
        }
    }

    /// Fold one item's outcome into the run, or end the run per policy
    fn settle(&mut self, run: &mut Run, index: usize, outcome: Result<Record>) -> Result<()> {
        let err = match outcome {
            Ok(record) => {
                run.result.record(index, self.options.fields.clean(record, self.kind()));
                return Ok(());
            }
            Err(err) => err,
        };

        if run.continue_on_error {
            tracing::warn!(table = %self.table, index, error = %err, "batch item failed, continuing");
            run.result.fail(index, err.to_string());
            return Ok(());
        }

        if run.rollback {
            self.state = BatchState::RolledBack;
            let compensated = run.log.compensate(self.backend, &self.table);
            tracing::warn!(
                table = %self.table,
                index,
                compensated,
                error = %err,
                "batch item failed, rolled back"
            );
            return Err(err);
        }

        self.state = BatchState::Failed;
        if run.total == 1 {
            return Err(err);
        }
        tracing::warn!(table = %self.table, index, error = %err, "batch item failed, stopping");
        run.result.fail(index, err.to_string());
        Err(ConnectorError::BatchFailure {
            message: run.verb.failure_message().to_string(),
            context: run.result.context(),
            cause: Box::new(err),
        })
    }

    fn commit(&mut self, mut run: Run) -> ExecutionResult {
        self.state = BatchState::Committing;
        run.log.clear();
        self.state = BatchState::Committed;
        if run.result.partial {
            tracing::info!(
                table = %self.table,
                failed = ?run.result.failed_indices,
                "batch committed with failures"
            );
        } else {
            tracing::debug!(table = %self.table, items = run.total, "batch committed");
        }
        run.result
    }

    fn execute_atomic(
        &mut self,
        mut run: Run,
        prepared: Vec<(usize, Result<Prepared>)>,
        partition_key: &str,
    ) -> Result<ExecutionResult> {
        let items: Vec<Prepared> = prepared
            .into_iter()
            .map(|(_, item)| item)
            .collect::<Result<_>>()?;

        let snapshots = if run.verb == Verb::Delete {
            self.fetch_by_row_keys(&items.iter().collect::<Vec<_>>(), partition_key)?
        } else {
            HashMap::new()
        };

        let writes = items
            .iter()
            .map(|item| match (item.verb, &item.key) {
                (Verb::Delete, Some(key)) => NativeWrite::Delete(key.clone()),
                (Verb::Replace, _) if self.upsert_allowed => NativeWrite::Upsert(item.record.clone()),
                (Verb::Replace, _) => NativeWrite::Replace(item.record.clone()),
                (Verb::Patch, _) => NativeWrite::Merge(item.record.clone()),
                _ => NativeWrite::Insert(item.record.clone()),
            })
            .collect();

        self.state = BatchState::Committing;
        tracing::debug!(
            table = %self.table,
            partition = partition_key,
            operations = items.len(),
            "submitting atomic batch"
        );

        match self.backend.submit_batch(&self.table, writes) {
            Ok(records) => {
                for (item, record) in items.iter().zip(records) {
                    let record = match (item.verb, &item.key) {
                        (Verb::Delete, Some(key)) => row_key_of(key)
                            .and_then(|rk| snapshots.get(rk).cloned())
                            .unwrap_or_else(|| key.to_record()),
                        _ => record,
                    };
                    run.result.record(item.index, self.options.fields.clean(record, self.kind()));
                }
                Ok(self.commit(run))
            }
            Err(BackendError::Batch { index, source }) => {
                self.state = BatchState::RolledBack;
                tracing::warn!(
                    table = %self.table,
                    index,
                    error = %source,
                    "atomic batch rejected, nothing applied"
                );
                Err(ConnectorError::from(*source))
            }
            Err(err) => {
                self.state = BatchState::Failed;
                Err(err.into())
            }
        }
    }

    /// Multi-key entity reads within one partition, fetched through row-key filters
    fn execute_id_reads(
        &mut self,
        mut run: Run,
        prepared: Vec<(usize, Result<Prepared>)>,
        partition_key: &str,
    ) -> Result<ExecutionResult> {
        let items: Vec<Prepared> = prepared
            .into_iter()
            .map(|(_, item)| item)
            .collect::<Result<_>>()?;
        let found = self.fetch_by_row_keys(&items.iter().collect::<Vec<_>>(), partition_key)?;

        for item in items {
            let outcome = item.key().and_then(|key| {
                row_key_of(key)
                    .and_then(|rk| found.get(rk).cloned())
                    .ok_or_else(|| {
                        ConnectorError::NotFound(format!("Record with identifier '{}' not found.", key))
                    })
            });
            self.settle(&mut run, item.index, outcome)?;
        }
        Ok(self.commit(run))
    }

    fn fetch_by_row_keys(
        &self,
        items: &[&Prepared],
        partition_key: &str,
    ) -> Result<HashMap<String, Record>> {
        let row_keys: Vec<String> = items
            .iter()
            .filter_map(|item| item.key.as_ref().and_then(row_key_of).map(str::to_string))
            .collect();

        let fields = FieldMap::open_for(BackendKind::Table);
        let params = Params::new();
        let compiler =
            PartitionedFilterCompiler::new(&fields, &params).with_max_ids(self.max_ids_per_filter);

        let mut found = HashMap::new();
        for filter in compiler.ids_filters(&row_keys, Some(partition_key)) {
            for record in self.backend.query(&self.table, &NativeQuery::new(filter))? {
                if let Some(Value::String(rk)) = record.get(ROW_KEY) {
                    found.insert(rk.clone(), record);
                }
            }
        }
        Ok(found)
    }
}

fn prepared_items(prepared: &[(usize, Result<Prepared>)]) -> Vec<&Prepared> {
    prepared.iter().filter_map(|(_, item)| item.as_ref().ok()).collect()
}

fn row_key_of(key: &RecordKey) -> Option<&str> {
    match key {
        RecordKey::Entity { row_key, .. } => Some(row_key),
        RecordKey::Document(_) => None,
    }
}

/// The single partition every item addresses, if all items are valid and agree.
/// `writes_only` also requires every item to be a write.
fn shared_partition(prepared: &[(usize, Result<Prepared>)], writes_only: bool) -> Option<String> {
    let mut shared: Option<&str> = None;
    for (_, item) in prepared {
        let item = item.as_ref().ok()?;
        if writes_only && !item.verb.is_write() {
            return None;
        }
        let pk = item.key.as_ref()?.partition_key()?;
        match shared {
            Some(existing) if existing != pk => return None,
            _ => shared = Some(pk),
        }
    }
    shared.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::SqliteTableStore;
    use crate::engine::nosql::LocalDocumentStore;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn seeded_table() -> SqliteTableStore {
        let store = SqliteTableStore::in_memory().unwrap();
        for rk in ["1", "2", "3"] {
            store
                .insert("t", record(json!({"PartitionKey": "P", "RowKey": rk, "v": 0})))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_verb_aliases() {
        assert_eq!(Verb::from_str("POST"), Some(Verb::Create));
        assert_eq!(Verb::from_str("put"), Some(Verb::Replace));
        assert_eq!(Verb::from_str("merge"), Some(Verb::Patch));
        assert_eq!(Verb::from_str("options"), None);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let store = seeded_table();
        let mut executor = BatchExecutor::new(&store, "t", BatchOptions::default());
        assert!(matches!(executor.execute(vec![]), Err(ConnectorError::BadRequest(_))));
    }

    #[test]
    fn test_conflicting_policies() {
        let store = seeded_table();
        let options = BatchOptions {
            rollback: true,
            continue_on_error: true,
            ..Default::default()
        };
        let ops = BatchOperation::from_records(
            Verb::Patch,
            vec![record(json!({"PartitionKey": "P", "RowKey": "1", "v": 1})); 2],
        );
        let mut executor = BatchExecutor::new(&store, "t", options.clone());
        assert!(matches!(executor.execute(ops), Err(ConnectorError::ConfigConflict)));
        assert_eq!(executor.state(), BatchState::Idle);

        // a single item ignores both flags
        let single = BatchOperation::from_records(
            Verb::Patch,
            vec![record(json!({"PartitionKey": "P", "RowKey": "1", "v": 1}))],
        );
        let mut executor = BatchExecutor::new(&store, "t", options);
        assert!(executor.execute(single).is_ok());
    }

    #[test]
    fn test_atomic_rollback_applies_nothing() {
        let store = seeded_table();
        let options = BatchOptions {
            rollback: true,
            ..Default::default()
        };
        let ops = BatchOperation::from_records(
            Verb::Replace,
            vec![
                record(json!({"PartitionKey": "P", "RowKey": "1", "v": 9})),
                record(json!({"PartitionKey": "P", "RowKey": "missing", "v": 9})),
            ],
        );
        let mut executor = BatchExecutor::new(&store, "t", options);
        let err = executor.execute(ops).unwrap_err();
        assert!(matches!(err, ConnectorError::NotFound(_)));
        assert_eq!(executor.state(), BatchState::RolledBack);
        assert_eq!(store.get("t", &RecordKey::entity("P", "1")).unwrap()["v"], json!(0));
    }

    #[test]
    fn test_atomic_delete_returns_snapshots() {
        let store = seeded_table();
        let options = BatchOptions {
            rollback: true,
            fields: FieldSelection::All,
            ..Default::default()
        };
        let keys = vec![RecordKey::entity("P", "1"), RecordKey::entity("P", "2")];
        let mut executor = BatchExecutor::new(&store, "t", options);
        let result = executor.execute(BatchOperation::from_keys(Verb::Delete, keys, None)).unwrap();
        let records = result.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["v"], json!(0));
        assert!(store.get("t", &RecordKey::entity("P", "1")).is_err());
        assert_eq!(executor.state(), BatchState::Committed);
    }

    #[test]
    fn test_fail_fast_reports_applied_items() {
        let store = seeded_table();
        let ops = BatchOperation::from_records(
            Verb::Patch,
            vec![
                record(json!({"PartitionKey": "P", "RowKey": "1", "v": 1})),
                record(json!({"PartitionKey": "P", "RowKey": "missing", "v": 1})),
                record(json!({"PartitionKey": "P", "RowKey": "3", "v": 1})),
            ],
        );
        let mut executor = BatchExecutor::new(&store, "t", BatchOptions::default());
        let err = executor.execute(ops).unwrap_err();
        match &err {
            ConnectorError::BatchFailure { message, context, cause } => {
                assert_eq!(message, "Not all requested records could be updated.");
                assert_eq!(context.error, vec![1]);
                assert_eq!(context.resource.len(), 2);
                assert!(matches!(**cause, ConnectorError::NotFound(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get("t", &RecordKey::entity("P", "1")).unwrap()["v"], json!(1));
        assert_eq!(store.get("t", &RecordKey::entity("P", "3")).unwrap()["v"], json!(0));
    }

    #[test]
    fn test_compensating_rollback_on_document_store() {
        let dir = tempdir().unwrap();
        let store = LocalDocumentStore::open_or_create(dir.path()).unwrap();
        store.insert("t", record(json!({"id": "a", "v": 0}))).unwrap();

        let options = BatchOptions {
            rollback: true,
            ..Default::default()
        };
        let ops = BatchOperation::from_records(
            Verb::Create,
            vec![record(json!({"id": "b", "v": 1})), record(json!({"id": "a", "v": 1}))],
        );
        let mut executor = BatchExecutor::new(&store, "t", options);
        assert!(executor.execute(ops).is_err());
        assert_eq!(executor.state(), BatchState::RolledBack);
        assert!(store.get("t", &RecordKey::document("b")).is_err());
        assert_eq!(store.get("t", &RecordKey::document("a")).unwrap()["v"], json!(0));
    }

    #[test]
    fn test_missing_identifier_never_reaches_backend() {
        let store = seeded_table();
        let options = BatchOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let ops = BatchOperation::from_records(
            Verb::Patch,
            vec![
                record(json!({"PartitionKey": "P", "v": 5})),
                record(json!({"PartitionKey": "P", "RowKey": "2", "v": 5})),
            ],
        );
        let mut executor = BatchExecutor::new(&store, "t", options);
        let result = executor.execute(ops).unwrap();
        assert_eq!(result.failed_indices, vec![0]);
        assert_eq!(
            result.envelope().resource[0],
            json!("Missing identifier: No valid row key found in request.")
        );
    }

    #[test]
    fn test_id_reads_in_one_partition() {
        let store = seeded_table();
        let keys: Vec<RecordKey> = ["3", "1", "nope"].iter().map(|rk| RecordKey::entity("P", rk)).collect();
        let options = BatchOptions {
            continue_on_error: true,
            fields: FieldSelection::All,
            ..Default::default()
        };
        let mut executor = BatchExecutor::new(&store, "t", options);
        let result = executor.execute(BatchOperation::from_keys(Verb::Get, keys, None)).unwrap();
        assert_eq!(result.failed_indices, vec![2]);
        let records = result.records();
        assert_eq!(records[0]["RowKey"], json!("3"));
        assert_eq!(records[1]["RowKey"], json!("1"));
    }

    #[test]
    fn test_partition_key_option_applies_to_records() {
        let store = SqliteTableStore::in_memory().unwrap();
        let options = BatchOptions {
            partition_key: Some("Q".into()),
            ..Default::default()
        };
        let ops = BatchOperation::from_records(Verb::Create, vec![record(json!({"RowKey": "1"}))]);
        let mut executor = BatchExecutor::new(&store, "t", options);
        let result = executor.execute(ops).unwrap();
        assert_eq!(
            Value::Object(result.records().remove(0)),
            json!({"PartitionKey": "Q", "RowKey": "1"})
        );
    }
}

//! Compensation log for non-atomic batches
//!
//! Every destructive call made under rollback is preceded by an entry holding
//! what it takes to undo it. On failure the entries are replayed newest first.

use super::executor::Verb;
use crate::engine::adapter::{Backend, BackendResult, Record, RecordKey};

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackEntry {
    /// The verb that was applied and must be undone
    pub verb: Verb,
    pub key: RecordKey,
    /// State before the call; `None` when the record did not exist
    pub prior: Option<Record>,
}

impl RollbackEntry {
    pub fn new(verb: Verb, key: RecordKey, prior: Option<Record>) -> Self {
        Self { verb, key, prior }
    }

    fn undo<B: Backend + ?Sized>(&self, backend: &B, table: &str) -> BackendResult<()> {
        match (self.verb, &self.prior) {
            (Verb::Create, _) | (Verb::Replace | Verb::Patch, None) => backend.delete(table, &self.key),
            (Verb::Replace | Verb::Patch, Some(prior)) => {
                backend.upsert(table, &self.key, prior.clone()).map(|_| ())
            }
            (Verb::Delete, Some(prior)) => backend.insert(table, prior.clone()).map(|_| ()),
            (Verb::Delete, None) | (Verb::Get, _) => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct RollbackLog {
    entries: Vec<RollbackEntry>,
}

impl RollbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: RollbackEntry) {
        self.entries.push(entry);
    }

    /// Drop the newest entry after its call failed without applying
    pub fn discard_last(&mut self) {
        self.entries.pop();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Undo every logged call, newest first. A failed compensation is logged
    /// and the rest still run. Returns the number of compensating calls issued.
    pub fn compensate<B: Backend + ?Sized>(&mut self, backend: &B, table: &str) -> usize {
        let mut issued = 0;
        while let Some(entry) = self.entries.pop() {
            if matches!(entry.verb, Verb::Get) || (entry.verb == Verb::Delete && entry.prior.is_none()) {
                continue;
            }
            issued += 1;
            if let Err(err) = entry.undo(backend, table) {
                tracing::error!(
                    table,
                    key = %entry.key,
                    verb = ?entry.verb,
                    error = %err,
                    "rollback compensation failed"
                );
            }
        }
        issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::nosql::LocalDocumentStore;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_compensation_restores_prior_state() {
        let dir = tempdir().unwrap();
        let store = LocalDocumentStore::open_or_create(dir.path()).unwrap();
        store.insert("t", record(json!({"id": "a", "v": 1}))).unwrap();
        store.insert("t", record(json!({"id": "b", "v": 2}))).unwrap();

        let mut log = RollbackLog::new();

        let prior_a = store.get("t", &RecordKey::document("a")).unwrap();
        log.record(RollbackEntry::new(Verb::Replace, RecordKey::document("a"), Some(prior_a)));
        store
            .replace("t", &RecordKey::document("a"), record(json!({"v": 10})))
            .unwrap();

        let prior_b = store.get("t", &RecordKey::document("b")).unwrap();
        log.record(RollbackEntry::new(Verb::Delete, RecordKey::document("b"), Some(prior_b)));
        store.delete("t", &RecordKey::document("b")).unwrap();

        store.insert("t", record(json!({"id": "c"}))).unwrap();
        log.record(RollbackEntry::new(Verb::Create, RecordKey::document("c"), None));

        assert_eq!(log.compensate(&store, "t"), 3);
        assert!(log.is_empty());
        assert_eq!(store.get("t", &RecordKey::document("a")).unwrap()["v"], json!(1));
        assert_eq!(store.get("t", &RecordKey::document("b")).unwrap()["v"], json!(2));
        assert!(store.get("t", &RecordKey::document("c")).is_err());
    }

    #[test]
    fn test_failed_compensation_does_not_stop_the_rest() {
        let dir = tempdir().unwrap();
        let store = LocalDocumentStore::open_or_create(dir.path()).unwrap();
        store.insert("t", record(json!({"id": "a"}))).unwrap();

        let mut log = RollbackLog::new();
        log.record(RollbackEntry::new(Verb::Create, RecordKey::document("a"), None));
        log.record(RollbackEntry::new(Verb::Create, RecordKey::document("missing"), None));

        assert_eq!(log.compensate(&store, "t"), 2);
        assert!(store.get("t", &RecordKey::document("a")).is_err());
    }
}

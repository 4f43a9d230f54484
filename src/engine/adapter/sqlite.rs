//! SQLite Entity Table Store
//!
//! Implements the partitioned entity table `Backend` on rusqlite + r2d2 connection
//! pooling. Entities live in one system table keyed by (table, PartitionKey, RowKey)
//! with their properties stored as a JSON bag. Native filter text is evaluated by
//! parsing it back into a filter tree; atomic batches run in one SQLite transaction.

use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::dialect::{BackendKind, PARTITION_KEY, ROW_KEY, TIMESTAMP};
use super::{Backend, BackendError, BackendResult, NativeQuery, NativeWrite, Record, RecordKey};
use crate::engine::filter::{FilterParser, Params, MAX_FILTER_COMPARISONS};

type DbPool = Pool<SqliteConnectionManager>;
type DbConn = PooledConnection<SqliteConnectionManager>;

/// Operations accepted in one atomic batch
pub const DEFAULT_MAX_BATCH_OPERATIONS: usize = 100;

pub struct SqliteTableStore {
    pool: DbPool,
    db_path: PathBuf,
    max_batch_operations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WriteMode {
    Insert,
    Replace,
    Upsert,
    Merge,
}

impl SqliteTableStore {
    pub fn new(db_path: &Path) -> BackendResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let store = Self {
            pool,
            db_path: db_path.to_path_buf(),
            max_batch_operations: DEFAULT_MAX_BATCH_OPERATIONS,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> BackendResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;

        let store = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
            max_batch_operations: DEFAULT_MAX_BATCH_OPERATIONS,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn with_max_batch(mut self, max_batch_operations: usize) -> Self {
        self.max_batch_operations = max_batch_operations.max(1);
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> BackendResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _dualstore_entities (
                tbl TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                properties TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (tbl, partition_key, row_key)
            )",
            [],
        )?;

        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        Ok(())
    }

    fn get_conn(&self) -> BackendResult<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Names of tables holding at least one entity
    pub fn tables(&self) -> BackendResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT tbl FROM _dualstore_entities ORDER BY tbl")?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tables)
    }
}

fn not_found(partition_key: &str, row_key: &str) -> BackendError {
    BackendError::NotFound(format!(
        "Record with identifier '{}' not found.",
        RecordKey::entity(partition_key, row_key)
    ))
}

fn entity_key(record: &Record) -> BackendResult<(String, String)> {
    match BackendKind::Table.key_of(record, None) {
        Ok(RecordKey::Entity { partition_key, row_key }) => Ok((partition_key, row_key)),
        Ok(other) => Err(BackendError::Rejected(format!("'{}' is not an entity key", other))),
        Err(message) => Err(BackendError::Rejected(message)),
    }
}

fn key_parts(key: &RecordKey) -> BackendResult<(&str, &str)> {
    match key {
        RecordKey::Entity { partition_key, row_key } => Ok((partition_key.as_str(), row_key.as_str())),
        RecordKey::Document(id) => Err(BackendError::Rejected(format!(
            "'{}' is not an entity key",
            id
        ))),
    }
}

/// Caller-settable properties: everything except the key and system fields
fn properties(record: &Record) -> Record {
    record
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), PARTITION_KEY | ROW_KEY | TIMESTAMP))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn to_entity(partition_key: String, row_key: String, props: &str, timestamp: String) -> BackendResult<Record> {
    let mut entity = Record::new();
    entity.insert(PARTITION_KEY.into(), Value::String(partition_key));
    entity.insert(ROW_KEY.into(), Value::String(row_key));
    entity.insert(TIMESTAMP.into(), Value::String(timestamp));
    if let Value::Object(props) = serde_json::from_str(props)? {
        entity.extend(props);
    }
    Ok(entity)
}

fn load(conn: &Connection, table: &str, partition_key: &str, row_key: &str) -> BackendResult<Option<Record>> {
    let row = conn
        .query_row(
            "SELECT properties, timestamp FROM _dualstore_entities
             WHERE tbl = ?1 AND partition_key = ?2 AND row_key = ?3",
            params![table, partition_key, row_key],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match row {
        Some((props, timestamp)) => Ok(Some(to_entity(
            partition_key.to_string(),
            row_key.to_string(),
            &props,
            timestamp,
        )?)),
        None => Ok(None),
    }
}

fn write_entity(
    conn: &Connection,
    table: &str,
    partition_key: &str,
    row_key: &str,
    record: &Record,
    mode: WriteMode,
) -> BackendResult<Record> {
    let existing = load(conn, table, partition_key, row_key)?;
    let mut props = properties(record);

    match (mode, &existing) {
        (WriteMode::Insert, Some(_)) => {
            return Err(BackendError::Conflict(format!(
                "The specified entity already exists: {}",
                RecordKey::entity(partition_key, row_key)
            )))
        }
        (WriteMode::Replace | WriteMode::Merge, None) => return Err(not_found(partition_key, row_key)),
        (WriteMode::Merge, Some(current)) => {
            let mut merged = properties(current);
            merged.extend(props);
            props = merged;
        }
        _ => {}
    }

    let timestamp = Utc::now().to_rfc3339();
    let bag = serde_json::to_string(&Value::Object(props.clone()))?;
    conn.execute(
        "INSERT OR REPLACE INTO _dualstore_entities (tbl, partition_key, row_key, properties, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![table, partition_key, row_key, bag, timestamp],
    )?;

    let mut entity = Record::new();
    entity.insert(PARTITION_KEY.into(), Value::String(partition_key.to_string()));
    entity.insert(ROW_KEY.into(), Value::String(row_key.to_string()));
    entity.insert(TIMESTAMP.into(), Value::String(timestamp));
    entity.extend(props);
    Ok(entity)
}

fn delete_entity(conn: &Connection, table: &str, partition_key: &str, row_key: &str) -> BackendResult<()> {
    let affected = conn.execute(
        "DELETE FROM _dualstore_entities WHERE tbl = ?1 AND partition_key = ?2 AND row_key = ?3",
        params![table, partition_key, row_key],
    )?;
    if affected == 0 {
        return Err(not_found(partition_key, row_key));
    }
    Ok(())
}

fn apply(conn: &Connection, table: &str, op: &NativeWrite) -> BackendResult<Record> {
    let (record, mode) = match op {
        NativeWrite::Delete(key) => {
            let (pk, rk) = key_parts(key)?;
            delete_entity(conn, table, pk, rk)?;
            return Ok(key.to_record());
        }
        NativeWrite::Insert(record) => (record, WriteMode::Insert),
        NativeWrite::Replace(record) => (record, WriteMode::Replace),
        NativeWrite::Upsert(record) => (record, WriteMode::Upsert),
        NativeWrite::Merge(record) => (record, WriteMode::Merge),
    };
    let (pk, rk) = entity_key(record)?;
    write_entity(conn, table, &pk, &rk, record, mode)
}

fn partition_of(op: &NativeWrite) -> Option<String> {
    match op {
        NativeWrite::Delete(key) => key.partition_key().map(str::to_string),
        NativeWrite::Insert(r) | NativeWrite::Replace(r) | NativeWrite::Upsert(r) | NativeWrite::Merge(r) => {
            entity_key(r).ok().map(|(pk, _)| pk)
        }
    }
}

impl Backend for SqliteTableStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Table
    }

    fn query(&self, table: &str, query: &NativeQuery) -> BackendResult<Vec<Record>> {
        let params: Params = query
            .params
            .iter()
            .map(|p| (p.placeholder.clone(), p.value.clone()))
            .collect();
        let filter = FilterParser::new(&params)
            .parse(&query.text)
            .map_err(|e| BackendError::Rejected(e.to_string()))?;

        if let Some(node) = &filter {
            let comparisons = node.comparison_count();
            if comparisons > MAX_FILTER_COMPARISONS {
                return Err(BackendError::Rejected(format!(
                    "filter has {} comparisons, the limit is {}",
                    comparisons, MAX_FILTER_COMPARISONS
                )));
            }
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT partition_key, row_key, properties, timestamp FROM _dualstore_entities
             WHERE tbl = ?1 ORDER BY partition_key, row_key",
        )?;
        let rows = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::new();
        for (pk, rk, props, timestamp) in rows {
            if query.limit.map_or(false, |limit| out.len() >= limit) {
                break;
            }
            let entity = to_entity(pk, rk, &props, timestamp)?;
            let keep = match &filter {
                Some(node) => node
                    .matches(&entity, &params, None)
                    .map_err(BackendError::Rejected)?,
                None => true,
            };
            if keep {
                out.push(entity);
            }
        }
        Ok(out)
    }

    fn get(&self, table: &str, key: &RecordKey) -> BackendResult<Record> {
        let (pk, rk) = key_parts(key)?;
        let conn = self.get_conn()?;
        load(&conn, table, pk, rk)?.ok_or_else(|| not_found(pk, rk))
    }

    fn insert(&self, table: &str, record: Record) -> BackendResult<Record> {
        let conn = self.get_conn()?;
        apply(&conn, table, &NativeWrite::Insert(record))
    }

    fn replace(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        let (pk, rk) = key_parts(key)?;
        let conn = self.get_conn()?;
        write_entity(&conn, table, pk, rk, &record, WriteMode::Replace)
    }

    fn upsert(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        let (pk, rk) = key_parts(key)?;
        let conn = self.get_conn()?;
        write_entity(&conn, table, pk, rk, &record, WriteMode::Upsert)
    }

    fn merge(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        let (pk, rk) = key_parts(key)?;
        let conn = self.get_conn()?;
        write_entity(&conn, table, pk, rk, &record, WriteMode::Merge)
    }

    fn delete(&self, table: &str, key: &RecordKey) -> BackendResult<()> {
        let (pk, rk) = key_parts(key)?;
        let conn = self.get_conn()?;
        delete_entity(&conn, table, pk, rk)
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }

    fn submit_batch(&self, table: &str, ops: Vec<NativeWrite>) -> BackendResult<Vec<Record>> {
        if ops.len() > self.max_batch_operations {
            return Err(BackendError::Rejected(format!(
                "batch of {} operations exceeds the limit of {}",
                ops.len(),
                self.max_batch_operations
            )));
        }
        let partitions: BTreeSet<Option<String>> = ops.iter().map(partition_of).collect();
        if partitions.len() > 1 {
            return Err(BackendError::Rejected(
                "all operations in a batch must share one partition key".into(),
            ));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut out = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            let record = apply(&tx, table, op).map_err(|e| BackendError::Batch {
                index,
                source: Box::new(e),
            })?;
            out.push(record);
        }
        tx.commit()?;

        tracing::debug!(table, operations = out.len(), "committed entity batch");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(pk: &str, rk: &str, extra: Value) -> Record {
        let mut record = extra.as_object().cloned().unwrap_or_default();
        record.insert(PARTITION_KEY.into(), json!(pk));
        record.insert(ROW_KEY.into(), json!(rk));
        record
    }

    #[test]
    fn test_entity_crud() {
        let store = SqliteTableStore::in_memory().unwrap();
        let key = RecordKey::entity("P", "1");

        let created = store.insert("people", entity("P", "1", json!({"name": "Ann", "Timestamp": "x"}))).unwrap();
        assert_eq!(created["name"], json!("Ann"));
        assert_ne!(created["Timestamp"], json!("x"));
        assert!(matches!(
            store.insert("people", entity("P", "1", json!({}))),
            Err(BackendError::Conflict(_))
        ));

        store.merge("people", &key, entity("P", "1", json!({"age": 30}))).unwrap();
        let merged = store.get("people", &key).unwrap();
        assert_eq!(merged["name"], json!("Ann"));
        assert_eq!(merged["age"], json!(30));

        store.replace("people", &key, entity("P", "1", json!({"age": 31}))).unwrap();
        let replaced = store.get("people", &key).unwrap();
        assert!(replaced.get("name").is_none());

        store.delete("people", &key).unwrap();
        let err = store.get("people", &key).unwrap_err();
        assert_eq!(err.to_string(), "Record with identifier 'P/1' not found.");
        assert!(matches!(store.delete("people", &key), Err(BackendError::NotFound(_))));
        assert!(matches!(
            store.replace("people", &key, entity("P", "1", json!({}))),
            Err(BackendError::NotFound(_))
        ));
    }

    #[test]
    fn test_query_evaluates_native_filter() {
        let store = SqliteTableStore::in_memory().unwrap();
        for (rk, age) in [("1", 20), ("2", 30), ("3", 40)] {
            store.insert("people", entity("P", rk, json!({"age": age}))).unwrap();
        }
        store.insert("people", entity("Q", "9", json!({"age": 99}))).unwrap();

        let hits = store
            .query("people", &NativeQuery::new("PartitionKey eq 'P' and age ge 30"))
            .unwrap();
        assert_eq!(hits.len(), 2);

        let all = store.query("people", &NativeQuery::new("").limit(Some(3))).unwrap();
        assert_eq!(all.len(), 3);

        let too_many: Vec<String> = (0..16).map(|i| format!("RowKey eq '{}'", i)).collect();
        let err = store
            .query("people", &NativeQuery::new(too_many.join(" or ")))
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[test]
    fn test_atomic_batch_rolls_back_on_failure() {
        let store = SqliteTableStore::in_memory().unwrap();
        store.insert("t", entity("P", "2", json!({}))).unwrap();

        let err = store
            .submit_batch(
                "t",
                vec![
                    NativeWrite::Insert(entity("P", "1", json!({"v": 1}))),
                    NativeWrite::Insert(entity("P", "2", json!({"v": 2}))),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Batch { index: 1, .. }));
        assert!(matches!(
            store.get("t", &RecordKey::entity("P", "1")),
            Err(BackendError::NotFound(_))
        ));

        let out = store
            .submit_batch(
                "t",
                vec![
                    NativeWrite::Insert(entity("P", "1", json!({"v": 1}))),
                    NativeWrite::Delete(RecordKey::entity("P", "2")),
                ],
            )
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(store.tables().unwrap(), vec!["t".to_string()]);
    }

    #[test]
    fn test_batch_requires_single_partition() {
        let store = SqliteTableStore::in_memory().unwrap().with_max_batch(2);
        let err = store
            .submit_batch(
                "t",
                vec![
                    NativeWrite::Insert(entity("P", "1", json!({}))),
                    NativeWrite::Insert(entity("Q", "1", json!({}))),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));

        let ops = (0..3)
            .map(|i| NativeWrite::Insert(entity("P", &i.to_string(), json!({}))))
            .collect();
        assert!(matches!(store.submit_batch("t", ops), Err(BackendError::Rejected(_))));
    }
}

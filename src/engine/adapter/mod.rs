//! Backend Adapter Layer
//!
//! Provides a trait-based abstraction over the two native stores.
//! Currently supports a partitioned entity table and a document store.

pub mod dialect;
pub mod sqlite;

pub use dialect::{BackendKind, NativeDialect, DOCUMENT_ID, PARTITION_KEY, ROW_KEY, TIMESTAMP};
pub use sqlite::SqliteTableStore;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// A record as exchanged with a backend: a flat JSON property bag
pub type Record = Map<String, Value>;

/// Universal result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Native client/service errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Batch operation {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<BackendError>,
    },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Address of a single record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Entity {
        #[serde(rename = "PartitionKey")]
        partition_key: String,
        #[serde(rename = "RowKey")]
        row_key: String,
    },
    Document(String),
}

impl RecordKey {
    pub fn entity(partition_key: &str, row_key: &str) -> Self {
        RecordKey::Entity {
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
        }
    }

    pub fn document(id: &str) -> Self {
        RecordKey::Document(id.to_string())
    }

    pub fn partition_key(&self) -> Option<&str> {
        match self {
            RecordKey::Entity { partition_key, .. } => Some(partition_key),
            RecordKey::Document(_) => None,
        }
    }

    /// Identifier fields as a record, used as output when nothing else is known
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        match self {
            RecordKey::Entity { partition_key, row_key } => {
                record.insert(dialect::PARTITION_KEY.into(), Value::String(partition_key.clone()));
                record.insert(dialect::ROW_KEY.into(), Value::String(row_key.clone()));
            }
            RecordKey::Document(id) => {
                record.insert(dialect::DOCUMENT_ID.into(), Value::String(id.clone()));
            }
        }
        record
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Entity { partition_key, row_key } => write!(f, "{}/{}", partition_key, row_key),
            RecordKey::Document(id) => write!(f, "{}", id),
        }
    }
}

/// A named value bound into a native query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub placeholder: String,
    pub value: Value,
}

/// A query in the backend's own language
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NativeQuery {
    /// Filter expression (entity table) or full SELECT statement (document store);
    /// an empty filter expression lists everything
    pub text: String,
    pub params: Vec<BoundParam>,
    pub limit: Option<usize>,
}

impl NativeQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Vec<BoundParam>) -> Self {
        self.params = params;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// One operation of an atomic native batch
#[derive(Debug, Clone, PartialEq)]
pub enum NativeWrite {
    Insert(Record),
    Replace(Record),
    Upsert(Record),
    Merge(Record),
    Delete(RecordKey),
}

/// Capabilities a native store offers to the connector core
pub trait Backend: Send + Sync {
    /// Which native store this is
    fn kind(&self) -> BackendKind;

    /// Run a native query and return matching records
    fn query(&self, table: &str, query: &NativeQuery) -> BackendResult<Vec<Record>>;

    /// Number of records a query matches, ignoring its limit
    fn count(&self, table: &str, query: &NativeQuery) -> BackendResult<usize> {
        let unlimited = NativeQuery {
            limit: None,
            ..query.clone()
        };
        Ok(self.query(table, &unlimited)?.len())
    }

    /// Fetch one record; absent records are `BackendError::NotFound`
    fn get(&self, table: &str, key: &RecordKey) -> BackendResult<Record>;

    /// Create a record; the key is taken from (or generated into) the record
    fn insert(&self, table: &str, record: Record) -> BackendResult<Record>;

    /// Overwrite an existing record
    fn replace(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record>;

    /// Overwrite or create a record
    fn upsert(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        self.replace(table, key, record)
    }

    /// Merge properties into an existing record
    fn merge(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record>;

    /// Remove a record
    fn delete(&self, table: &str, key: &RecordKey) -> BackendResult<()>;

    /// Whether `submit_batch` applies its operations all-or-nothing
    fn supports_atomic_batch(&self) -> bool {
        false
    }

    /// Apply all operations atomically, returning one record per operation
    fn submit_batch(&self, table: &str, ops: Vec<NativeWrite>) -> BackendResult<Vec<Record>> {
        let _ = (table, ops);
        Err(BackendError::Unsupported(format!(
            "{} backend has no atomic batches",
            self.kind()
        )))
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn query(&self, table: &str, query: &NativeQuery) -> BackendResult<Vec<Record>> {
        (**self).query(table, query)
    }

    fn count(&self, table: &str, query: &NativeQuery) -> BackendResult<usize> {
        (**self).count(table, query)
    }

    fn get(&self, table: &str, key: &RecordKey) -> BackendResult<Record> {
        (**self).get(table, key)
    }

    fn insert(&self, table: &str, record: Record) -> BackendResult<Record> {
        (**self).insert(table, record)
    }

    fn replace(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        (**self).replace(table, key, record)
    }

    fn upsert(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        (**self).upsert(table, key, record)
    }

    fn merge(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        (**self).merge(table, key, record)
    }

    fn delete(&self, table: &str, key: &RecordKey) -> BackendResult<()> {
        (**self).delete(table, key)
    }

    fn supports_atomic_batch(&self) -> bool {
        (**self).supports_atomic_batch()
    }

    fn submit_batch(&self, table: &str, ops: Vec<NativeWrite>) -> BackendResult<Vec<Record>> {
        (**self).submit_batch(table, ops)
    }
}

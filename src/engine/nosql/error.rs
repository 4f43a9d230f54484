//! Document Store Error Types

use std::io;
use thiserror::Error;

use crate::engine::adapter::BackendError;

#[derive(Error, Debug)]
pub enum NoSqlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Invalid document id: {0}")]
    InvalidDocumentId(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Document ID already exists: {0}")]
    DuplicateId(String),
}

pub type Result<T> = std::result::Result<T, NoSqlError>;

impl From<NoSqlError> for BackendError {
    fn from(err: NoSqlError) -> Self {
        match err {
            NoSqlError::Io(e) => BackendError::Io(e),
            NoSqlError::Json(e) => BackendError::Json(e),
            NoSqlError::DocumentNotFound(id) => {
                BackendError::NotFound(format!("Record with identifier '{}' not found.", id))
            }
            NoSqlError::DuplicateId(id) => {
                BackendError::Conflict(format!("Document ID already exists: {}", id))
            }
            other => BackendError::Rejected(other.to_string()),
        }
    }
}

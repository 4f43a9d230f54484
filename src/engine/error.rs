//! Connector Error Types
//!
//! One taxonomy for everything a filter or batch request can fail with, plus the
//! status mapping collaborators use when they render a response.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::adapter::BackendError;

/// Per-index detail attached to an aggregated batch failure
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchContext {
    /// Indices (0-based, input order) of the items that failed
    pub error: Vec<usize>,
    /// One entry per processed item: a cleaned record, or the error message at failed indices
    pub resource: Vec<Value>,
}

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Invalid or unparsable filter: {0}")]
    BadFilter(String),

    #[error("Invalid value for field '{field}': {reason}")]
    BadValue { field: String, reason: String },

    #[error("Rollback and continue can not both be requested for a batch")]
    ConfigConflict,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Backend fault: {0}")]
    BackendFault(#[source] BackendError),

    #[error("Batch Error: {message}")]
    BatchFailure {
        message: String,
        context: BatchContext,
        #[source]
        cause: Box<ConnectorError>,
    },
}

impl ConnectorError {
    pub fn bad_value(field: &str, reason: impl Into<String>) -> Self {
        ConnectorError::BadValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP-style status for collaborators that render responses
    pub fn status_code(&self) -> u16 {
        match self {
            ConnectorError::BadFilter(_)
            | ConnectorError::BadValue { .. }
            | ConnectorError::ConfigConflict
            | ConnectorError::BadRequest(_)
            | ConnectorError::MissingIdentifier(_)
            | ConnectorError::BatchFailure { .. } => 400,
            ConnectorError::NotFound(_) => 404,
            ConnectorError::BackendFault(_) => 500,
        }
    }

    /// Structured `{error, resource}` context of an aggregated failure
    pub fn context(&self) -> Option<Value> {
        match self {
            ConnectorError::BatchFailure { context, .. } => serde_json::to_value(context).ok(),
            _ => None,
        }
    }

    /// The error that triggered an aggregated failure, or `self` otherwise
    pub fn root_cause(&self) -> &ConnectorError {
        match self {
            ConnectorError::BatchFailure { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<BackendError> for ConnectorError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => ConnectorError::NotFound(what),
            other => ConnectorError::BackendFault(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

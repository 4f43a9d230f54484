//! Native Dialect Generator
//!
//! Generates backend-specific query syntax from the generic filter model.
//! Supports the partitioned entity table and the document store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::{Record, RecordKey};
use crate::engine::filter::ast::{ComparisonOp, LogicalOp};

/// Partition half of an entity key
pub const PARTITION_KEY: &str = "PartitionKey";
/// Row half of an entity key
pub const ROW_KEY: &str = "RowKey";
/// System-maintained entity property, never settable by callers
pub const TIMESTAMP: &str = "Timestamp";
/// Document identifier field
pub const DOCUMENT_ID: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Table,
    Document,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Table => write!(f, "table"),
            BackendKind::Document => write!(f, "document"),
        }
    }
}

impl BackendKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" | "entity" | "azure_table" => Some(BackendKind::Table),
            "document" | "doc" | "documentdb" => Some(BackendKind::Document),
            _ => None,
        }
    }

    /// Fields that identify a record and are always present in output
    pub fn identifier_fields(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Table => &[PARTITION_KEY, ROW_KEY],
            BackendKind::Document => &[DOCUMENT_ID],
        }
    }

    /// Extract a record's key. An explicit partition key overrides the record's own.
    pub fn key_of(&self, record: &Record, partition_key: Option<&str>) -> Result<RecordKey, String> {
        match self {
            BackendKind::Table => {
                let partition = partition_key
                    .map(str::to_string)
                    .or_else(|| key_text(record.get(PARTITION_KEY)))
                    .filter(|pk| !pk.is_empty())
                    .ok_or_else(|| "No valid partition key found in request.".to_string())?;
                let row = key_text(record.get(ROW_KEY))
                    .filter(|rk| !rk.is_empty())
                    .ok_or_else(|| "No valid row key found in request.".to_string())?;
                Ok(RecordKey::Entity {
                    partition_key: partition,
                    row_key: row,
                })
            }
            BackendKind::Document => key_text(record.get(DOCUMENT_ID))
                .filter(|id| !id.is_empty())
                .map(RecordKey::Document)
                .ok_or_else(|| format!("No {} field found in record.", DOCUMENT_ID)),
        }
    }
}

fn key_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Backend-aware syntax generator
pub struct NativeDialect {
    pub kind: BackendKind,
}

impl NativeDialect {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }

    /// Native token for a comparison. Value lists and null checks have no entity-table token.
    pub fn comparison(&self, op: ComparisonOp) -> Option<&'static str> {
        match (self.kind, op) {
            (BackendKind::Table, ComparisonOp::Eq) => Some("eq"),
            (BackendKind::Table, ComparisonOp::Ne) => Some("ne"),
            (BackendKind::Table, ComparisonOp::Gt) => Some("gt"),
            (BackendKind::Table, ComparisonOp::Ge) => Some("ge"),
            (BackendKind::Table, ComparisonOp::Lt) => Some("lt"),
            (BackendKind::Table, ComparisonOp::Le) => Some("le"),
            (BackendKind::Table, _) => None,

            (BackendKind::Document, ComparisonOp::Eq) => Some("="),
            (BackendKind::Document, ComparisonOp::Ne) => Some("<>"),
            (BackendKind::Document, ComparisonOp::Gt) => Some(">"),
            (BackendKind::Document, ComparisonOp::Ge) => Some(">="),
            (BackendKind::Document, ComparisonOp::Lt) => Some("<"),
            (BackendKind::Document, ComparisonOp::Le) => Some("<="),
            (BackendKind::Document, ComparisonOp::In) => Some("IN"),
            (BackendKind::Document, ComparisonOp::IsNull) => Some("IS NULL"),
            (BackendKind::Document, ComparisonOp::IsNotNull) => Some("IS NOT NULL"),
            (BackendKind::Document, ComparisonOp::Like) => None,
        }
    }

    pub fn logical(&self, op: LogicalOp) -> &'static str {
        match (self.kind, op) {
            (BackendKind::Table, LogicalOp::And) => "and",
            (BackendKind::Table, LogicalOp::Or) => "or",
            (BackendKind::Table, LogicalOp::Not) => "not",
            (BackendKind::Document, LogicalOp::And) => "AND",
            (BackendKind::Document, LogicalOp::Or) => "OR",
            (BackendKind::Document, LogicalOp::Not) => "NOT",
        }
    }

    /// Inline a value as a native literal
    pub fn literal(&self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }

    /// Field reference as the native language expects it
    pub fn qualify(&self, table: &str, field: &str) -> String {
        match self.kind {
            BackendKind::Table => field.to_string(),
            BackendKind::Document => format!("{}.{}", table, field),
        }
    }

    /// Qualified ORDER BY list. The entity table has no native ordering.
    pub fn order_by(&self, table: &str, order_by: &str) -> Option<String> {
        if self.kind == BackendKind::Table {
            return None;
        }
        let parts: Vec<String> = order_by
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| self.qualify(table, part))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

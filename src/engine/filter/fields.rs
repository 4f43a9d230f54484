//! Field descriptors supplied by the schema layer

use serde::{Deserialize, Serialize};

use crate::engine::adapter::BackendKind;
use crate::engine::error::{ConnectorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Schema-less or unknown: values keep their inferred type
    Any,
}

impl FieldType {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "string" | "text" | "varchar" | "id" => FieldType::String,
            "int" | "integer" | "int32" | "int64" | "bigint" => FieldType::Integer,
            "number" | "float" | "double" | "decimal" => FieldType::Number,
            "bool" | "boolean" => FieldType::Boolean,
            _ => FieldType::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub native_type: FieldType,
    #[serde(default)]
    pub is_identifier: bool,
    #[serde(default)]
    pub required: bool,
}

impl FieldDescriptor {
    pub fn new(name: &str, native_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            native_type,
            is_identifier: false,
            required: false,
        }
    }

    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self.required = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Field lookup for one table. Closed maps reject unknown fields; open maps
/// (schema-less tables) accept any field as `FieldType::Any`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMap {
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub open: bool,
}

impl FieldMap {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields, open: false }
    }

    /// Schema-less map carrying only the backend's identifier fields
    pub fn open_for(kind: BackendKind) -> Self {
        Self {
            fields: Vec::new(),
            open: true,
        }
        .with_identifiers(kind)
    }

    /// Add the backend's identifier descriptors when the schema left them out
    pub fn with_identifiers(mut self, kind: BackendKind) -> Self {
        for id in kind.identifier_fields() {
            if !self.fields.iter().any(|f| f.name == *id) {
                self.fields
                    .push(FieldDescriptor::new(id, FieldType::String).identifier());
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// Resolve a filter field, failing on unknown fields of a closed map
    pub fn resolve(&self, name: &str) -> Result<FieldDescriptor> {
        match self.get(name) {
            Some(field) => Ok(field.clone()),
            None if self.open => Ok(FieldDescriptor::new(name, FieldType::Any)),
            None => Err(ConnectorError::BadFilter(format!(
                "Invalid or unknown field '{}' in filter.",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_map_rejects_unknown_fields() {
        let map = FieldMap::new(vec![FieldDescriptor::new("age", FieldType::Integer)]);
        assert_eq!(map.resolve("AGE").unwrap().name, "age");
        assert!(matches!(map.resolve("status"), Err(ConnectorError::BadFilter(_))));
    }

    #[test]
    fn test_open_map_includes_identifiers() {
        let map = FieldMap::open_for(BackendKind::Table);
        assert!(map.get("PartitionKey").unwrap().is_identifier);
        assert!(map.get("RowKey").unwrap().is_identifier);
        assert_eq!(map.resolve("anything").unwrap().native_type, FieldType::Any);
    }
}

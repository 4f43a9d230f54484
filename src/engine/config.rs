//! dualstore Configuration Module
//! Handles loading and validating dualstore.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::adapter::BackendKind;
use crate::engine::filter::DEFAULT_MAX_IDS_PER_FILTER;

pub const CONFIG_FILE: &str = "dualstore.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub version: String,
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Table {
        path: PathBuf,
        #[serde(default)]
        default_partition_key: Option<String>,
        #[serde(default)]
        upsert_allowed: bool,
    },
    Document {
        path: PathBuf,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Table { .. } => BackendKind::Table,
            BackendConfig::Document { .. } => BackendKind::Document,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            BackendConfig::Table { path, .. } | BackendConfig::Document { path } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_max_ids_per_filter")]
    pub max_ids_per_filter: usize,
    #[serde(default = "default_max_batch_operations")]
    pub max_batch_operations: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            max_ids_per_filter: default_max_ids_per_filter(),
            max_batch_operations: default_max_batch_operations(),
        }
    }
}

fn default_max_records() -> usize {
    1000
}

fn default_max_ids_per_filter() -> usize {
    DEFAULT_MAX_IDS_PER_FILTER
}

fn default_max_batch_operations() -> usize {
    100
}

impl ConnectorConfig {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: ConnectorConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::Invalid("service name cannot be empty".to_string()));
        }
        let limits = &self.limits;
        if limits.max_ids_per_filter == 0 || limits.max_ids_per_filter > DEFAULT_MAX_IDS_PER_FILTER {
            return Err(ConfigError::Invalid(format!(
                "max_ids_per_filter must be between 1 and {}",
                DEFAULT_MAX_IDS_PER_FILTER
            )));
        }
        if limits.max_batch_operations == 0 {
            return Err(ConfigError::Invalid("max_batch_operations must be positive".to_string()));
        }
        Ok(())
    }

    /// Backend path resolved against the project directory
    pub fn backend_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(self.backend.path())
    }

    pub fn default_for_service(name: &str, kind: BackendKind) -> Self {
        let backend = match kind {
            BackendKind::Table => BackendConfig::Table {
                path: PathBuf::from("./data/tables.db"),
                default_partition_key: None,
                upsert_allowed: false,
            },
            BackendKind::Document => BackendConfig::Document {
                path: PathBuf::from("./data/documents"),
            },
        };
        Self {
            version: "0.1.0".to_string(),
            service: ServiceConfig {
                name: name.to_string(),
            },
            backend,
            limits: LimitsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config = ConnectorConfig::default_for_service("orders", BackendKind::Table);
        config.save(dir.path()).unwrap();

        let loaded = ConnectorConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.service.name, "orders");
        assert_eq!(loaded.backend.kind(), BackendKind::Table);
        assert_eq!(loaded.limits, LimitsConfig::default());
        assert_eq!(loaded.backend_path(dir.path()), dir.path().join("./data/tables.db"));
    }

    #[test]
    fn test_missing_config() {
        let dir = tempdir().unwrap();
        assert!(matches!(ConnectorConfig::load(dir.path()), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_limits_default_when_omitted() {
        let config: ConnectorConfig = serde_json::from_str(
            r#"{
                "version": "0.1.0",
                "service": {"name": "docs"},
                "backend": {"type": "document", "path": "./docs"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.backend.kind(), BackendKind::Document);
        assert_eq!(config.limits.max_ids_per_filter, 14);
        assert_eq!(config.limits.max_records, 1000);
    }

    #[test]
    fn test_rejects_oversized_id_chunks() {
        let dir = tempdir().unwrap();
        let mut config = ConnectorConfig::default_for_service("orders", BackendKind::Table);
        config.limits.max_ids_per_filter = 20;
        config.save(dir.path()).unwrap();
        assert!(matches!(ConnectorConfig::load(dir.path()), Err(ConfigError::Invalid(_))));
    }
}

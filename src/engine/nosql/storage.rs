//! Document Store Backend
//!
//! Main entry point for the file-backed document store: one directory per
//! collection, one JSON file per document. No multi-document atomicity.

use std::fs;
use std::path::{Path, PathBuf};

use super::collection::Collection;
use super::document::Document;
use super::error::Result;
use super::query;
use crate::engine::adapter::{
    Backend, BackendError, BackendKind, BackendResult, NativeQuery, Record, RecordKey,
};

pub struct LocalDocumentStore {
    base_path: PathBuf,
}

impl LocalDocumentStore {
    /// Open a store rooted at `path`, creating the directory if needed
    pub fn open_or_create(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn collection(&self, name: &str) -> Result<Collection> {
        Collection::open(&self.base_path, name)
    }

    /// List all collections
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut collections = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.is_dir() {
                if let Some(name) = path.file_name() {
                    let name = name.to_string_lossy();
                    if !name.starts_with('.') && !name.starts_with('_') {
                        collections.push(name.to_string());
                    }
                }
            }
        }

        collections.sort();
        Ok(collections)
    }
}

fn document_id(key: &RecordKey) -> BackendResult<&str> {
    match key {
        RecordKey::Document(id) => Ok(id.as_str()),
        other => Err(BackendError::Rejected(format!(
            "'{}' is not a document id",
            other
        ))),
    }
}

impl Backend for LocalDocumentStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn query(&self, table: &str, native: &NativeQuery) -> BackendResult<Vec<Record>> {
        let docs = self.collection(table)?.all()?;
        Ok(query::execute(native, docs)?)
    }

    fn count(&self, table: &str, native: &NativeQuery) -> BackendResult<usize> {
        let docs = self.collection(table)?.all()?;
        Ok(query::count(native, docs)?)
    }

    fn get(&self, table: &str, key: &RecordKey) -> BackendResult<Record> {
        let id = document_id(key)?;
        Ok(self.collection(table)?.get(id)?.to_record())
    }

    fn insert(&self, table: &str, record: Record) -> BackendResult<Record> {
        let doc = self.collection(table)?.insert(Document::from_record(record))?;
        Ok(doc.to_record())
    }

    fn replace(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        let id = document_id(key)?;
        Ok(self.collection(table)?.replace(id, record)?.to_record())
    }

    fn upsert(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        let id = document_id(key)?;
        Ok(self.collection(table)?.upsert(id, record)?.to_record())
    }

    fn merge(&self, table: &str, key: &RecordKey, record: Record) -> BackendResult<Record> {
        let id = document_id(key)?;
        Ok(self.collection(table)?.merge(id, record)?.to_record())
    }

    fn delete(&self, table: &str, key: &RecordKey) -> BackendResult<()> {
        let id = document_id(key)?;
        Ok(self.collection(table)?.delete(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::BoundParam;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_store_lifecycle() {
        let dir = tempdir().unwrap();
        let store = LocalDocumentStore::open_or_create(dir.path()).unwrap();
        assert!(store.list_collections().unwrap().is_empty());

        let created = store.insert("users", record(json!({"name": "Alice", "age": 30}))).unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(store.list_collections().unwrap(), vec!["users".to_string()]);

        let key = RecordKey::document(&id);
        store.merge("users", &key, record(json!({"age": 31}))).unwrap();
        assert_eq!(store.get("users", &key).unwrap()["age"], json!(31));

        let query = NativeQuery::new("SELECT * FROM users WHERE users.age > @age1")
            .with_params(vec![BoundParam { placeholder: "@age1".into(), value: json!(30) }]);
        assert_eq!(store.query("users", &query).unwrap().len(), 1);
        assert_eq!(store.count("users", &query).unwrap(), 1);

        store.delete("users", &key).unwrap();
        assert!(matches!(store.get("users", &key), Err(BackendError::NotFound(_))));
        assert!(matches!(
            store.replace("users", &key, Record::new()),
            Err(BackendError::NotFound(_))
        ));
        assert!(!store.supports_atomic_batch());
    }

    #[test]
    fn test_reopen_keeps_documents() {
        let dir = tempdir().unwrap();
        {
            let store = LocalDocumentStore::open_or_create(dir.path()).unwrap();
            store.insert("test", record(json!({"id": "x", "v": 1}))).unwrap();
        }
        let store = LocalDocumentStore::open_or_create(dir.path()).unwrap();
        assert_eq!(store.query("test", &NativeQuery::new("")).unwrap().len(), 1);
        assert!(matches!(
            store.insert("test", record(json!({"id": "x"}))),
            Err(BackendError::Conflict(_))
        ));
    }
}

//! Collection management for the document store

use std::fs;
use std::path::{Path, PathBuf};

use super::document::Document;
use super::error::{NoSqlError, Result};
use crate::engine::adapter::Record;

/// A directory of `<id>.json` documents
pub struct Collection {
    pub name: String,
    path: PathBuf,
}

impl Collection {
    /// Open a collection; the directory is created on first write
    pub fn open(base_path: &Path, name: &str) -> Result<Self> {
        validate_collection_name(name)?;
        Ok(Self {
            name: name.to_string(),
            path: base_path.join(name),
        })
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    fn doc_path(&self, id: &str) -> Result<PathBuf> {
        validate_document_id(id)?;
        Ok(self.path.join(format!("{}.json", id)))
    }

    fn write(&self, doc: &Document) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        let content = serde_json::to_string_pretty(doc)?;
        fs::write(self.doc_path(&doc.id)?, content)?;
        Ok(())
    }

    /// Insert a new document, failing if its id is taken
    pub fn insert(&self, doc: Document) -> Result<Document> {
        if self.doc_path(&doc.id)?.exists() {
            return Err(NoSqlError::DuplicateId(doc.id));
        }
        self.write(&doc)?;
        Ok(doc)
    }

    pub fn get(&self, id: &str) -> Result<Document> {
        let doc_path = self.doc_path(id)?;
        if !doc_path.exists() {
            return Err(NoSqlError::DocumentNotFound(id.to_string()));
        }
        let content = fs::read_to_string(doc_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrite an existing document
    pub fn replace(&self, id: &str, data: Record) -> Result<Document> {
        if !self.doc_path(id)?.exists() {
            return Err(NoSqlError::DocumentNotFound(id.to_string()));
        }
        self.upsert(id, data)
    }

    /// Overwrite or create
    pub fn upsert(&self, id: &str, data: Record) -> Result<Document> {
        let doc = Document::with_id(id.to_string(), data);
        self.write(&doc)?;
        Ok(doc)
    }

    /// Read-modify-write merge of properties
    pub fn merge(&self, id: &str, data: Record) -> Result<Document> {
        let mut doc = self.get(id)?;
        doc.merge(data);
        self.write(&doc)?;
        Ok(doc)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let doc_path = self.doc_path(id)?;
        if !doc_path.exists() {
            return Err(NoSqlError::DocumentNotFound(id.to_string()));
        }
        fs::remove_file(doc_path)?;
        Ok(())
    }

    /// List all document IDs
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        if !self.exists() {
            return Ok(ids);
        }

        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |e| e == "json") {
                if let Some(stem) = path.file_stem() {
                    ids.push(stem.to_string_lossy().to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    pub fn all(&self) -> Result<Vec<Document>> {
        let ids = self.list_ids()?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            docs.push(self.get(&id)?);
        }
        Ok(docs)
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NoSqlError::InvalidCollectionName("name cannot be empty".to_string()));
    }
    if name.starts_with('_') {
        return Err(NoSqlError::InvalidCollectionName("name cannot start with underscore".to_string()));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(NoSqlError::InvalidCollectionName("name must be alphanumeric".to_string()));
    }
    Ok(())
}

fn validate_document_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'));
    if !valid {
        return Err(NoSqlError::InvalidDocumentId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_collection_crud() {
        let dir = tempdir().unwrap();
        let col = Collection::open(dir.path(), "users").unwrap();
        assert!(!col.exists());

        let doc = col.insert(Document::from_record(record(json!({"name": "Alice", "age": 30})))).unwrap();
        let id = doc.id.clone();
        assert!(col.exists());

        assert!(matches!(
            col.insert(Document::from_record(record(json!({"id": id})))),
            Err(NoSqlError::DuplicateId(_))
        ));

        col.merge(&id, record(json!({"age": 31}))).unwrap();
        let updated = col.get(&id).unwrap();
        assert_eq!(updated.get("age"), Some(&json!(31)));
        assert_eq!(updated.get("name"), Some(&json!("Alice")));

        col.replace(&id, record(json!({"age": 32}))).unwrap();
        assert!(col.get(&id).unwrap().get("name").is_none());

        col.delete(&id).unwrap();
        assert!(matches!(col.get(&id), Err(NoSqlError::DocumentNotFound(_))));
        assert!(matches!(col.replace(&id, Record::new()), Err(NoSqlError::DocumentNotFound(_))));
        assert_eq!(col.list_ids().unwrap().len(), 0);
    }

    #[test]
    fn test_rejects_unsafe_names() {
        let dir = tempdir().unwrap();
        assert!(Collection::open(dir.path(), "../x").is_err());
        let col = Collection::open(dir.path(), "docs").unwrap();
        assert!(matches!(col.get("../../etc"), Err(NoSqlError::InvalidDocumentId(_))));
    }
}

use super::{matches, values_equal, DocumentStore};
use crate::document::{document_id, Document, FINISHED_FIELD, ID_FIELD, SENTINEL_ID};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

type Collection = Arc<RwLock<Vec<Document>>>;

/// In-process document store.
///
/// Each collection sits behind its own lock, so writers to different
/// output collections never contend with each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> Option<Collection> {
        self.collections.get(name).map(|entry| entry.value().clone())
    }

    /// Replaces `name` with `documents`, rejecting duplicate ids.
    pub fn import_collection(&self, name: &str, documents: Vec<Document>) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for doc in &documents {
            if doc.contains_key(ID_FIELD) && !seen.insert(document_id(doc)?) {
                return Err(Error::Store(format!("duplicate key {} in import of {}", doc[ID_FIELD], name)));
            }
        }
        self.collections
            .insert(name.to_string(), Arc::new(RwLock::new(documents)));
        Ok(())
    }

    pub fn export_collection(&self, name: &str) -> Option<Vec<Document>> {
        self.collection(name).map(|c| c.read().clone())
    }

    pub fn len(&self, name: &str) -> usize {
        self.collection(name).map(|c| c.read().len()).unwrap_or(0)
    }

    /// Loads a JSON array of objects from `path` into `name` as is.
    pub fn import_json_file(&self, name: &str, path: &Path) -> Result<usize> {
        let documents = read_json_documents(path)?;
        let count = documents.len();
        self.import_collection(name, documents)?;
        Ok(count)
    }

    /// Stores raw `rows` as a fully processed input dataset: a finished
    /// metadata record under the sentinel id, rows renumbered `1..=n`.
    pub fn import_dataset(&self, name: &str, rows: Vec<Document>) -> Result<usize> {
        let fields: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys())
            .map(String::as_str)
            .filter(|field| *field != ID_FIELD)
            .collect();

        let mut sentinel = Document::new();
        sentinel.insert(ID_FIELD.into(), Value::from(SENTINEL_ID));
        sentinel.insert("datasetName".into(), Value::from(name));
        sentinel.insert("fields".into(), Value::from(fields.into_iter().collect::<Vec<_>>()));
        sentinel.insert(FINISHED_FIELD.into(), Value::Bool(true));

        let count = rows.len();
        let mut documents = Vec::with_capacity(count + 1);
        documents.push(sentinel);
        for (index, mut row) in rows.into_iter().enumerate() {
            row.insert(ID_FIELD.into(), Value::from(index as u64 + 1));
            documents.push(row);
        }
        self.import_collection(name, documents)?;
        Ok(count)
    }

    /// Writes `name` to `path` as a pretty JSON array.
    pub fn export_json_file(&self, name: &str, path: &Path) -> Result<usize> {
        let documents = self
            .export_collection(name)
            .ok_or_else(|| Error::Store(format!("no collection {}", name)))?;
        let values: Vec<Value> = documents.into_iter().map(Value::Object).collect();
        std::fs::write(path, serde_json::to_string_pretty(&values)?)?;
        Ok(values.len())
    }
}

/// Reads a file holding a JSON array of objects.
pub fn read_json_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(doc) => Ok(doc),
                other => Err(Error::InvalidDocument(format!(
                    "expected object in {}, got {}",
                    path.display(),
                    other
                ))),
            })
            .collect(),
        _ => Err(Error::InvalidDocument(format!(
            "{} must contain a JSON array",
            path.display()
        ))),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        Ok(self
            .collection(collection)
            .map(|c| c.read().iter().filter(|doc| matches(doc, filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>> {
        Ok(self
            .collection(collection)
            .and_then(|c| c.read().iter().find(|doc| matches(doc, filter)).cloned()))
    }

    async fn update_one(&self, collection: &str, filter: &Document, patch: &Document) -> Result<bool> {
        let Some(collection_ref) = self.collection(collection) else {
            return Ok(false);
        };
        let mut documents = collection_ref.write();
        let Some(doc) = documents.iter_mut().find(|doc| matches(doc, filter)) else {
            return Ok(false);
        };
        if let Some(new_id) = patch.get(ID_FIELD) {
            if doc.get(ID_FIELD) != Some(new_id) {
                return Err(Error::Store(format!("_id of a document in {} is immutable", collection)));
            }
        }
        for (field, value) in patch {
            doc.insert(field.clone(), value.clone());
        }
        debug!(collection, fields = patch.len(), "update_one");
        Ok(true)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        let collection_ref = self
            .collections
            .entry(collection.to_string())
            .or_default()
            .value()
            .clone();
        let mut documents = collection_ref.write();
        if let Some(id) = document.get(ID_FIELD) {
            if documents.iter().any(|doc| doc.get(ID_FIELD).is_some_and(|existing| values_equal(existing, id))) {
                return Err(Error::Store(format!("duplicate key {} in {}", id, collection)));
            }
        }
        documents.push(document);
        Ok(())
    }

    async fn delete(&self, collection: &str) -> Result<()> {
        if self.collections.remove(collection).is_some() {
            debug!(collection, "dropped collection");
        }
        Ok(())
    }
}

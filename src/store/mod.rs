//! Collection-oriented document store seam.

pub mod memory;

pub use memory::{read_json_documents, MemoryStore};

use crate::document::{Document, StoredDocument};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Narrow CRUD surface the builder needs from its backing store.
///
/// Filters are equality matches on top-level fields; an empty filter
/// matches every document. Patches are merged into the first match with
/// `$set` semantics. Implementations must be safe to share across worker
/// threads.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>>;

    /// Returns whether a document matched.
    async fn update_one(&self, collection: &str, filter: &Document, patch: &Document) -> Result<bool>;

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()>;

    /// Drops the whole collection. Dropping a missing collection is not an error.
    async fn delete(&self, collection: &str) -> Result<()>;
}

/// Equality match of every filter field against the document.
pub fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field).is_some_and(|actual| values_equal(actual, expected)))
}

// 1 and 1.0 are the same id
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Reads the first document matching `filter` and validates its shape.
pub async fn load_stored_document(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &Document,
) -> Result<Option<StoredDocument>> {
    match store.find_one(collection, filter).await? {
        Some(doc) => StoredDocument::classify(doc).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches() {
        let doc = json!({"_id": 1, "label": "setosa", "width": 2.5}).as_object().cloned().unwrap();
        let filter = |v: Value| v.as_object().cloned().unwrap();

        assert!(matches(&doc, &Document::new()));
        assert!(matches(&doc, &filter(json!({"_id": 1}))));
        assert!(matches(&doc, &filter(json!({"_id": 1.0, "label": "setosa"}))));
        assert!(!matches(&doc, &filter(json!({"_id": 2}))));
        assert!(!matches(&doc, &filter(json!({"missing": null}))));
    }
}

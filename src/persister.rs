//! Writes a variant's predictions and closes out its job.

use crate::document::{Document, JobMetadata, ID_FIELD, SENTINEL_ID};
use crate::engine::{Frame, Record, ENGINE_INTERNAL_COLUMNS};
use crate::error::Result;
use crate::registry::MetadataRegistry;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Timing and evaluation of one fitted variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub fit_duration_seconds: f64,
    pub f1: Option<f64>,
    pub accuracy: Option<f64>,
}

pub struct ResultPersister {
    store: Arc<dyn DocumentStore>,
    registry: Arc<MetadataRegistry>,
}

impl ResultPersister {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<MetadataRegistry>) -> Self {
        Self { store, registry }
    }

    /// Metrics first, then rows `1..=n` in order, then `finished`. An error
    /// at any step leaves the job unfinished. Returns the row count.
    pub async fn persist(&self, job: &JobMetadata, report: &TrainingReport, predictions: Frame) -> Result<usize> {
        self.registry
            .record_training_result(job, report.fit_duration_seconds, report.f1, report.accuracy)
            .await?;

        let mut written = 0;
        for (index, record) in predictions.into_rows().into_iter().enumerate() {
            let id = index as u64 + 1;
            self.store
                .insert_one(&job.output_name, row_document(id, record))
                .await?;
            written += 1;
        }
        debug!(output = %job.output_name, rows = written, "prediction rows stored");

        self.registry.mark_finished(&job.output_name).await?;
        info!(
            output = %job.output_name,
            variant = %job.variant,
            rows = written,
            fit_seconds = report.fit_duration_seconds,
            "predictions persisted"
        );
        Ok(written)
    }
}

/// Converts a predicted row into a stored document under `id`.
pub fn row_document(id: u64, record: Record) -> Document {
    debug_assert_ne!(id, SENTINEL_ID);
    let mut doc: Document = record
        .into_iter()
        .filter(|(column, _)| !ENGINE_INTERNAL_COLUMNS.contains(&column.as_str()))
        .map(|(column, cell)| (column, cell.into_json()))
        .collect();
    doc.insert(ID_FIELD.to_string(), Value::from(id));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Cell, FEATURES_COLUMN, PROBABILITY_COLUMN, RAW_PREDICTION_COLUMN};
    use crate::store::MemoryStore;
    use crate::variant::Variant;
    use serde_json::json;

    fn predicted_row(label: f64) -> Record {
        let mut row = Record::new();
        row.insert("width".into(), Cell::from(1.5));
        row.insert("label".into(), Cell::from(label));
        row.insert(FEATURES_COLUMN.into(), Cell::Vector(vec![1.5]));
        row.insert(RAW_PREDICTION_COLUMN.into(), Cell::Vector(vec![3.0, 1.0]));
        row.insert(PROBABILITY_COLUMN.into(), Cell::Vector(vec![0.75, 0.25]));
        row.insert("prediction".into(), Cell::from(0.0));
        row
    }

    #[test]
    fn test_row_document() {
        let doc = row_document(4, predicted_row(1.0));
        assert_eq!(doc["_id"], json!(4));
        assert_eq!(doc[PROBABILITY_COLUMN], json!([0.75, 0.25]));
        assert_eq!(doc["prediction"], json!(0.0));
        assert!(!doc.contains_key(FEATURES_COLUMN));
        assert!(!doc.contains_key(RAW_PREDICTION_COLUMN));
    }

    #[tokio::test]
    async fn test_persist_writes_dense_ids_then_finishes() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(MetadataRegistry::new(store.clone(), "builder/sparkml"));
        let persister = ResultPersister::new(store.clone(), registry.clone());

        let job = registry.create_job(Variant::RandomForest, "irisTrain", "irisTest").await.unwrap();
        let predictions = Frame::new(vec![], (0..5).map(|i| predicted_row(i as f64)).collect());
        let report = TrainingReport {
            fit_duration_seconds: 0.5,
            f1: Some(0.8),
            accuracy: Some(0.75),
        };

        let rows = persister.persist(&job, &report, predictions).await.unwrap();
        assert_eq!(rows, 5);

        let docs = store.export_collection("irisTestRF").unwrap();
        let mut ids: Vec<u64> = docs.iter().map(|d| d["_id"].as_u64().unwrap()).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);

        let meta = registry.load("irisTestRF").await.unwrap().unwrap();
        assert!(meta.finished);
        assert_eq!(meta.fit_duration_seconds, Some(0.5));
        assert_eq!(meta.accuracy, Some(0.75));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_job_unfinished() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(MetadataRegistry::new(store.clone(), "builder/sparkml"));
        let persister = ResultPersister::new(store.clone(), registry.clone());

        let job = registry.create_job(Variant::LogisticRegression, "a", "b").await.unwrap();
        // a row already sits at id 2, so the second insert collides
        store
            .insert_one("bLR", json!({"_id": 2}).as_object().cloned().unwrap())
            .await
            .unwrap();
        let predictions = Frame::new(vec![], vec![predicted_row(0.0), predicted_row(1.0)]);
        let report = TrainingReport {
            fit_duration_seconds: 0.1,
            f1: None,
            accuracy: None,
        };

        assert!(persister.persist(&job, &report, predictions).await.is_err());
        assert!(!registry.load("bLR").await.unwrap().unwrap().finished);
    }
}

//! Job metadata records.
//!
//! Every call is a point write against the store; nothing is cached.

use crate::document::{
    sentinel_filter, Document, JobFailure, JobMetadata, MetadataRecord, ERROR_FIELD,
    FINISHED_FIELD,
};
use crate::error::{Error, Result};
use crate::store::{load_stored_document, DocumentStore};
use crate::variant::Variant;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub struct MetadataRegistry {
    store: Arc<dyn DocumentStore>,
    metadata_type: String,
}

impl MetadataRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, metadata_type: impl Into<String>) -> Self {
        Self {
            store,
            metadata_type: metadata_type.into(),
        }
    }

    /// Claims the output collection for `variant` and writes its initial
    /// record. Any previous collection of that name is dropped first.
    pub async fn create_job(&self, variant: Variant, train: &str, test: &str) -> Result<JobMetadata> {
        let job = JobMetadata::new(&self.metadata_type, variant, train, test);
        self.store.delete(&job.output_name).await?;
        self.store.insert_one(&job.output_name, job.to_document()?).await?;
        info!(output = %job.output_name, variant = %variant, "job created");
        Ok(job)
    }

    /// Merges timing and evaluation metrics. Leaves `finished` alone.
    pub async fn record_training_result(
        &self,
        job: &JobMetadata,
        fit_duration_seconds: f64,
        f1: Option<f64>,
        accuracy: Option<f64>,
    ) -> Result<()> {
        let mut patch = Document::new();
        patch.insert("fitTime".into(), Value::from(fit_duration_seconds));
        if let Some(f1) = f1 {
            patch.insert("F1".into(), Value::from(f1));
        }
        if let Some(accuracy) = accuracy {
            patch.insert("accuracy".into(), Value::from(accuracy));
        }
        self.patch(&job.output_name, patch).await
    }

    /// Attaches a background failure so pollers can tell it from "running".
    pub async fn record_failure(&self, output_name: &str, err: &Error) -> Result<()> {
        let failure = JobFailure::from(err);
        let mut patch = Document::new();
        patch.insert(ERROR_FIELD.into(), serde_json::to_value(&failure)?);
        self.patch(output_name, patch).await
    }

    /// Callers guarantee every row of `output_name` is already stored.
    pub async fn mark_finished(&self, output_name: &str) -> Result<()> {
        let mut patch = Document::new();
        patch.insert(FINISHED_FIELD.into(), Value::Bool(true));
        self.patch(output_name, patch).await?;
        info!(output = output_name, "job finished");
        Ok(())
    }

    pub async fn load(&self, output_name: &str) -> Result<Option<JobMetadata>> {
        match self.metadata_record(output_name).await? {
            Some(record) => record.as_job().map(Some),
            None => Ok(None),
        }
    }

    /// The sentinel record of any collection, including input datasets.
    pub async fn metadata_record(&self, collection: &str) -> Result<Option<MetadataRecord>> {
        match load_stored_document(self.store.as_ref(), collection, &sentinel_filter()).await? {
            Some(stored) => stored.into_metadata().map(Some),
            None => Ok(None),
        }
    }

    async fn patch(&self, output_name: &str, patch: Document) -> Result<()> {
        debug!(output = output_name, fields = ?patch.keys().collect::<Vec<_>>(), "patching metadata");
        if self.store.update_one(output_name, &sentinel_filter(), &patch).await? {
            Ok(())
        } else {
            Err(Error::Store(format!("no metadata record in {}", output_name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::JobState;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn registry() -> (Arc<MemoryStore>, MetadataRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = MetadataRegistry::new(store.clone(), "builder/sparkml");
        (store, registry)
    }

    #[tokio::test]
    async fn test_create_job_claims_collection() {
        let (store, registry) = registry();
        store
            .insert_one("irisTestLR", json!({"_id": 5, "stale": true}).as_object().cloned().unwrap())
            .await
            .unwrap();

        let job = registry
            .create_job(Variant::LogisticRegression, "irisTrain", "irisTest")
            .await
            .unwrap();
        assert_eq!(job.output_name, "irisTestLR");
        assert!(!job.finished);

        // stale contents are gone, only the sentinel remains
        assert_eq!(store.len("irisTestLR"), 1);
        let loaded = registry.load("irisTestLR").await.unwrap().unwrap();
        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn test_training_result_keeps_finished() {
        let (_store, registry) = registry();
        let job = registry.create_job(Variant::DecisionTree, "a", "b").await.unwrap();

        registry.record_training_result(&job, 1.5, Some(0.9), None).await.unwrap();
        let loaded = registry.load("bDT").await.unwrap().unwrap();
        assert_eq!(loaded.fit_duration_seconds, Some(1.5));
        assert_eq!(loaded.f1, Some(0.9));
        assert_eq!(loaded.accuracy, None);
        assert!(!loaded.finished);

        registry.mark_finished("bDT").await.unwrap();
        registry.record_training_result(&job, 2.0, None, Some(0.5)).await.unwrap();
        let loaded = registry.load("bDT").await.unwrap().unwrap();
        assert!(loaded.finished);
        assert_eq!(loaded.state(), JobState::Finished);
    }

    #[tokio::test]
    async fn test_record_failure() {
        let (_store, registry) = registry();
        registry.create_job(Variant::NaiveBayes, "a", "b").await.unwrap();

        let err = Error::variant("NB", "negative feature values");
        registry.record_failure("bNB", &err).await.unwrap();

        let loaded = registry.load("bNB").await.unwrap().unwrap();
        match loaded.state() {
            JobState::Failed { kind, message } => {
                assert_eq!(kind, "variant-error");
                assert!(message.contains("negative feature values"));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_patch_without_record_fails() {
        let (_store, registry) = registry();
        assert!(matches!(registry.mark_finished("missing").await, Err(Error::Store(_))));
        assert!(registry.load("missing").await.unwrap().is_none());
    }
}

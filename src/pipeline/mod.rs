//! Feature pipeline adapter.
//!
//! Loads the two input datasets through the compute engine, strips
//! metadata, and runs one registered transform to obtain the shared
//! feature set for a batch.

pub mod assembler;
pub mod transform;

pub use assembler::{EvaluationSource, VectorAssembler};
pub use transform::{
    FeatureTransform, TransformOutputs, TransformRegistry, EVALUATION_OUTPUT, TESTING_OUTPUT,
    TRAINING_OUTPUT,
};

use crate::document::{ID_FIELD, METADATA_FIELDS, SENTINEL_ID};
use crate::engine::{Cell, ComputeEngine, Frame};
use crate::error::{Error, Result};
use crate::scheduler::WorkerPool;
use std::sync::Arc;
use tracing::{debug, info};

/// Feature artifacts shared read-only by every variant of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub training: Frame,
    pub testing: Frame,
    pub evaluation: Option<Frame>,
}

impl FeatureSet {
    pub fn from_outputs(mut outputs: TransformOutputs) -> Result<Self> {
        let training = take_required(&mut outputs, TRAINING_OUTPUT)?;
        let testing = take_required(&mut outputs, TESTING_OUTPUT)?;
        let evaluation = outputs.remove(EVALUATION_OUTPUT).ok_or_else(|| {
            Error::Pipeline(format!("transform did not produce {}", EVALUATION_OUTPUT))
        })?;
        if !outputs.is_empty() {
            debug!(extra = ?outputs.keys().collect::<Vec<_>>(), "ignoring extra transform outputs");
        }
        Ok(Self {
            training,
            testing,
            evaluation,
        })
    }
}

fn take_required(outputs: &mut TransformOutputs, name: &str) -> Result<Frame> {
    match outputs.remove(name) {
        Some(Some(frame)) => Ok(frame),
        Some(None) => Err(Error::Pipeline(format!("transform produced an empty {}", name))),
        None => Err(Error::Pipeline(format!("transform did not produce {}", name))),
    }
}

/// Drops the sentinel row and bookkeeping columns from a loaded dataset.
pub fn strip_metadata(frame: Frame) -> Frame {
    frame
        .filter(|row| row.get(ID_FIELD).and_then(Cell::as_f64) != Some(SENTINEL_ID as f64))
        .drop_columns(&METADATA_FIELDS)
}

pub struct FeaturePipeline {
    engine: Arc<dyn ComputeEngine>,
    pool: Arc<WorkerPool>,
}

impl FeaturePipeline {
    pub fn new(engine: Arc<dyn ComputeEngine>, pool: Arc<WorkerPool>) -> Self {
        Self { engine, pool }
    }

    /// Any failure here is a pipeline error: no variant has started yet.
    pub async fn prepare(
        &self,
        train_name: &str,
        test_name: &str,
        transform: Arc<dyn FeatureTransform>,
    ) -> Result<FeatureSet> {
        let training = self.load(train_name).await?;
        let testing = self.load(test_name).await?;
        info!(
            transform = transform.name(),
            train = train_name,
            test = test_name,
            train_rows = training.len(),
            test_rows = testing.len(),
            "running feature transform"
        );

        let outputs = self
            .pool
            .compute(move || transform.apply(training, testing))
            .await
            .map_err(into_pipeline_error)?;
        FeatureSet::from_outputs(outputs)
    }

    async fn load(&self, name: &str) -> Result<Frame> {
        let frame = self
            .engine
            .load(name)
            .await
            .map_err(|e| Error::Pipeline(format!("loading {}: {}", name, e)))?;
        Ok(strip_metadata(frame))
    }
}

fn into_pipeline_error(err: Error) -> Error {
    match err {
        Error::Pipeline(_) => err,
        other => Error::Pipeline(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded() -> Frame {
        let docs = vec![
            json!({"_id": 0, "finished": true, "datasetName": "iris", "fields": ["x"]}),
            json!({"_id": 1, "x": 1.0}),
            json!({"_id": 2, "x": 2.0}),
        ];
        Frame::from_documents(docs.into_iter().map(|d| d.as_object().cloned().unwrap()).collect())
    }

    #[test]
    fn test_strip_metadata() {
        let frame = strip_metadata(loaded());
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.columns(), &["x"]);
    }

    #[test]
    fn test_feature_set_requires_all_outputs() {
        let mut outputs = TransformOutputs::new();
        outputs.insert(TRAINING_OUTPUT.into(), Some(Frame::default()));
        outputs.insert(TESTING_OUTPUT.into(), Some(Frame::default()));
        let err = FeatureSet::from_outputs(outputs.clone()).unwrap_err();
        assert!(matches!(err, Error::Pipeline(ref m) if m.contains(EVALUATION_OUTPUT)));

        outputs.insert(EVALUATION_OUTPUT.into(), None);
        let set = FeatureSet::from_outputs(outputs.clone()).unwrap();
        assert!(set.evaluation.is_none());

        outputs.insert(TESTING_OUTPUT.into(), None);
        assert!(FeatureSet::from_outputs(outputs).is_err());
    }
}

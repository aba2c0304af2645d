use crate::engine::Frame;
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub const TRAINING_OUTPUT: &str = "features_training";
pub const TESTING_OUTPUT: &str = "features_testing";
pub const EVALUATION_OUTPUT: &str = "features_evaluation";

/// Named frames produced by a transform. A present key with `None`
/// declares the output as intentionally empty.
pub type TransformOutputs = BTreeMap<String, Option<Frame>>;

/// A registered feature-engineering step.
///
/// Transforms see only the two input frames and return named outputs.
/// They are registered by the hosting process, never supplied by callers.
pub trait FeatureTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, training: Frame, testing: Frame) -> Result<TransformOutputs>;
}

#[derive(Default)]
pub struct TransformRegistry {
    transforms: DashMap<String, Arc<dyn FeatureTransform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, transform: Arc<dyn FeatureTransform>) -> Result<()> {
        match self.transforms.entry(transform.name().to_string()) {
            Entry::Occupied(entry) => Err(Error::Config(format!(
                "transform {} is already registered",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                info!(transform = %entry.key(), "registered feature transform");
                entry.insert(transform);
                Ok(())
            }
        }
    }

    /// Looks up a transform; unknown names are pipeline errors.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn FeatureTransform>> {
        self.transforms
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Pipeline(format!("no feature transform registered as {}", name)))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transforms.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

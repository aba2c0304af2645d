//! Compute engine capability.
//!
//! The builder never fits models itself. It loads datasets, fits and
//! transforms through [`ComputeEngine`], and only coordinates the work.

pub mod evaluation;
pub mod frame;
pub mod local;

pub use frame::{Cell, Frame, Record};
pub use local::{ClassifierSuite, LocalEngine, PriorClassifier};

use crate::error::Result;
use crate::variant::Variant;
use async_trait::async_trait;

pub const FEATURES_COLUMN: &str = "features";
pub const LABEL_COLUMN: &str = "label";
pub const RAW_PREDICTION_COLUMN: &str = "rawPrediction";
pub const PROBABILITY_COLUMN: &str = "probability";
pub const PREDICTION_COLUMN: &str = "prediction";

/// Columns that only make sense inside the engine and are never stored.
pub const ENGINE_INTERNAL_COLUMNS: [&str; 2] = [FEATURES_COLUMN, RAW_PREDICTION_COLUMN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Label-frequency weighted F1.
    F1,
    Accuracy,
}

#[async_trait]
pub trait ComputeEngine: Send + Sync {
    /// Loads a named collection as a frame, metadata included.
    async fn load(&self, collection: &str) -> Result<Frame>;

    /// Fits `variant` on a frame with `features` and `label` columns.
    /// CPU bound; callers run it on the blocking pool.
    fn fit(&self, variant: Variant, training: &Frame) -> Result<Box<dyn FittedModel>>;

    /// Scores a transformed frame by its `label` and `prediction` columns.
    fn evaluate(&self, predictions: &Frame, metric: Metric) -> Result<f64>;
}

/// A fitted model. `transform` appends `rawPrediction`, `probability` and
/// `prediction` to every row.
pub trait FittedModel: Send + Sync {
    fn transform(&self, frame: &Frame) -> Result<Frame>;
}

/// Training capability behind one variant.
pub trait Classifier: Send + Sync {
    fn fit(&self, training: &Frame) -> Result<Box<dyn FittedModel>>;
}

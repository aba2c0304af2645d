pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod persister;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod validator;
pub mod variant;

pub use config::BuilderConfig;
pub use document::{Document, JobFailure, JobMetadata, JobState, StoredDocument, SENTINEL_ID};
pub use engine::{
    Cell, Classifier, ClassifierSuite, ComputeEngine, FittedModel, Frame, LocalEngine, Metric,
    PriorClassifier, Record,
};
pub use error::{Error, Result, ValidationError};
pub use logging::init_logging;
pub use metrics::{MetricsRecorder, METRICS};
pub use orchestrator::{Batch, BatchSummary, TrainingOrchestrator};
pub use persister::{ResultPersister, TrainingReport};
pub use pipeline::{
    EvaluationSource, FeaturePipeline, FeatureSet, FeatureTransform, TransformOutputs,
    TransformRegistry, VectorAssembler,
};
pub use registry::MetadataRegistry;
pub use scheduler::WorkerPool;
pub use service::{Accepted, AcceptedJob, BuildRequest, BuilderService};
pub use store::{DocumentStore, MemoryStore};
pub use validator::PreconditionValidator;
pub use variant::Variant;

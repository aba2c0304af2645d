//! Batch training.
//!
//! A batch prepares its features once, then trains every requested
//! variant concurrently against them. Results are collected and persisted
//! strictly in submission order, so persistence of earlier variants
//! overlaps with training of later ones. A failing variant is recorded on
//! its own metadata record and never affects its siblings.

use crate::document::JobMetadata;
use crate::engine::{ComputeEngine, Frame, Metric};
use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::persister::{ResultPersister, TrainingReport};
use crate::pipeline::{FeaturePipeline, FeatureSet, FeatureTransform};
use crate::registry::MetadataRegistry;
use crate::scheduler::WorkerPool;
use crate::store::DocumentStore;
use crate::variant::Variant;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Jobs created by one submission, all sharing one input pair and transform.
#[derive(Clone)]
pub struct Batch {
    pub jobs: Vec<JobMetadata>,
    pub train: String,
    pub test: String,
    pub transform: Arc<dyn FeatureTransform>,
}

/// Outcome of a finished batch, per output collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub finished: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Everything a variant produces before persistence.
pub struct VariantOutcome {
    pub report: TrainingReport,
    pub predictions: Frame,
}

pub struct TrainingOrchestrator {
    engine: Arc<dyn ComputeEngine>,
    pool: Arc<WorkerPool>,
    pipeline: FeaturePipeline,
    registry: Arc<MetadataRegistry>,
    persister: ResultPersister,
}

impl TrainingOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        engine: Arc<dyn ComputeEngine>,
        pool: Arc<WorkerPool>,
        registry: Arc<MetadataRegistry>,
    ) -> Self {
        Self {
            pipeline: FeaturePipeline::new(engine.clone(), pool.clone()),
            persister: ResultPersister::new(store, registry.clone()),
            engine,
            pool,
            registry,
        }
    }

    /// Hands the batch to the worker pool and returns without waiting.
    pub fn schedule(self: &Arc<Self>, batch: Batch) -> Result<JoinHandle<BatchSummary>> {
        let orchestrator = self.clone();
        self.pool.submit(async move { orchestrator.run_batch(batch).await })
    }

    pub async fn run_batch(&self, batch: Batch) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let outputs: Vec<&str> = batch.jobs.iter().map(|j| j.output_name.as_str()).collect();
        info!(stage = "accepted", train = %batch.train, test = %batch.test, jobs = ?outputs, "batch started");

        let features = match self
            .pipeline
            .prepare(&batch.train, &batch.test, batch.transform.clone())
            .await
        {
            Ok(features) => Arc::new(features),
            Err(err) => {
                error!(train = %batch.train, test = %batch.test, error = %err, "feature preparation failed");
                for job in &batch.jobs {
                    self.fail(job, &err, &mut summary).await;
                }
                return summary;
            }
        };
        info!(
            stage = "features_prepared",
            training = features.training.len(),
            testing = features.testing.len(),
            evaluation = features.evaluation.as_ref().map(Frame::len),
            "features prepared"
        );

        let handles: Vec<_> = batch
            .jobs
            .iter()
            .map(|job| self.spawn_variant(job.variant, features.clone()))
            .collect();

        for (job, handle) in batch.jobs.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(Error::variant(job.variant, format!("task aborted: {}", join_err))),
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.fail(job, &as_variant_error(job.variant, err), &mut summary).await;
                    continue;
                }
            };

            METRICS
                .read()
                .fit_duration(job.variant.tag(), outcome.report.fit_duration_seconds);
            match self.persister.persist(job, &outcome.report, outcome.predictions).await {
                Ok(rows) => {
                    METRICS.read().job_finished(job.variant.tag(), rows);
                    summary.finished.push(job.output_name.clone());
                }
                Err(err) => self.fail(job, &err, &mut summary).await,
            }
        }

        info!(
            stage = "batch_complete",
            finished = summary.finished.len(),
            failed = summary.failed.len(),
            "batch complete"
        );
        summary
    }

    fn spawn_variant(&self, variant: Variant, features: Arc<FeatureSet>) -> JoinHandle<Result<VariantOutcome>> {
        let engine = self.engine.clone();
        let pool = self.pool.clone();
        self.pool.spawn(async move {
            pool.compute(move || train_variant(engine.as_ref(), variant, &features))
                .await
        })
    }

    async fn fail(&self, job: &JobMetadata, err: &Error, summary: &mut BatchSummary) {
        warn!(output = %job.output_name, variant = %job.variant, kind = err.kind(), error = %err, "job failed");
        METRICS.read().job_failed(job.variant.tag(), err.kind());
        if let Err(record_err) = self.registry.record_failure(&job.output_name, err).await {
            error!(output = %job.output_name, error = %record_err, "could not record job failure");
        }
        summary
            .failed
            .push((job.output_name.clone(), err.kind().to_string()));
    }
}

/// Fit, optionally evaluate, then predict. Runs on a blocking worker.
pub fn train_variant(engine: &dyn ComputeEngine, variant: Variant, features: &FeatureSet) -> Result<VariantOutcome> {
    let started = Instant::now();
    let model = engine.fit(variant, &features.training)?;
    let fit_duration_seconds = started.elapsed().as_secs_f64();

    let (f1, accuracy) = match &features.evaluation {
        Some(evaluation) => {
            let scored = model.transform(evaluation)?;
            (
                Some(engine.evaluate(&scored, Metric::F1)?),
                Some(engine.evaluate(&scored, Metric::Accuracy)?),
            )
        }
        None => (None, None),
    };

    let predictions = model.transform(&features.testing)?;
    Ok(VariantOutcome {
        report: TrainingReport {
            fit_duration_seconds,
            f1,
            accuracy,
        },
        predictions,
    })
}

fn as_variant_error(variant: Variant, err: Error) -> Error {
    match err {
        Error::Variant { .. } => err,
        other => Error::variant(variant, other),
    }
}

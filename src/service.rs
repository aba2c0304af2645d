//! Entry point for callers: submit builds, poll jobs, read results.

use crate::config::BuilderConfig;
use crate::document::{document_id, Document, JobState, SENTINEL_ID};
use crate::engine::ComputeEngine;
use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::orchestrator::{Batch, TrainingOrchestrator};
use crate::pipeline::TransformRegistry;
use crate::registry::MetadataRegistry;
use crate::scheduler::WorkerPool;
use crate::store::DocumentStore;
use crate::validator::PreconditionValidator;
use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// A request to train one model per variant on a train/test pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub variants: Vec<String>,
    pub train_dataset_name: String,
    pub test_dataset_name: String,
    /// Name of a registered feature transform.
    pub transform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedJob {
    pub variant: Variant,
    pub output_name: String,
    pub result_uri: String,
}

/// Synchronous answer to an accepted build; the jobs keep running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    pub jobs: Vec<AcceptedJob>,
}

pub struct BuilderService {
    config: BuilderConfig,
    store: Arc<dyn DocumentStore>,
    registry: Arc<MetadataRegistry>,
    validator: PreconditionValidator,
    orchestrator: Arc<TrainingOrchestrator>,
    transforms: Arc<TransformRegistry>,
    pool: Arc<WorkerPool>,
    submission: Mutex<()>,
}

impl BuilderService {
    /// Must be called from inside a tokio runtime.
    pub fn new(
        config: BuilderConfig,
        store: Arc<dyn DocumentStore>,
        engine: Arc<dyn ComputeEngine>,
        transforms: Arc<TransformRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);
        let registry = Arc::new(MetadataRegistry::new(store.clone(), config.metadata_type.clone()));
        let validator = PreconditionValidator::new(store.clone(), registry.clone());
        let orchestrator = Arc::new(TrainingOrchestrator::new(
            store.clone(),
            engine,
            pool.clone(),
            registry.clone(),
        ));

        Ok(Self {
            config,
            store,
            registry,
            validator,
            orchestrator,
            transforms,
            pool,
            submission: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Validates, claims one output collection per variant and schedules
    /// the batch. Returns as soon as the jobs exist; training happens in
    /// the background.
    pub async fn submit(&self, request: BuildRequest) -> Result<Accepted> {
        // validation and job creation must not interleave with another submission
        let _claim = self.submission.lock().await;

        if !self.pool.is_accepting() {
            return Err(Error::Shutdown);
        }

        let variants = match self
            .validator
            .validate(&request.variants, &request.train_dataset_name, &request.test_dataset_name)
            .await
        {
            Ok(variants) => variants,
            Err(err) => {
                let code = match &err {
                    Error::Validation(validation) => validation.code(),
                    other => other.kind(),
                };
                warn!(code, error = %err, "build request rejected");
                METRICS.read().submission_rejected(code);
                return Err(err);
            }
        };

        let transform = self.transforms.resolve(&request.transform).map_err(|err| {
            warn!(transform = %request.transform, error = %err, "build request rejected");
            METRICS.read().submission_rejected(err.kind());
            err
        })?;

        // from here on every claimed output is released again on error
        let mut jobs = Vec::with_capacity(variants.len());
        for variant in variants {
            match self
                .registry
                .create_job(variant, &request.train_dataset_name, &request.test_dataset_name)
                .await
            {
                Ok(job) => jobs.push(job),
                Err(err) => {
                    let mut claimed: Vec<String> = jobs.iter().map(|j| j.output_name.clone()).collect();
                    claimed.push(variant.output_name(&request.test_dataset_name));
                    self.release(&claimed, &err).await;
                    return Err(err);
                }
            }
        }

        let accepted = Accepted {
            jobs: jobs
                .iter()
                .map(|job| AcceptedJob {
                    variant: job.variant,
                    output_name: job.output_name.clone(),
                    result_uri: self.config.result_uri(&job.output_name),
                })
                .collect(),
        };

        let scheduled = self.orchestrator.schedule(Batch {
            jobs,
            train: request.train_dataset_name,
            test: request.test_dataset_name,
            transform,
        });
        if let Err(err) = scheduled {
            let claimed: Vec<String> = accepted.jobs.iter().map(|j| j.output_name.clone()).collect();
            self.release(&claimed, &err).await;
            return Err(err);
        }

        for job in &accepted.jobs {
            METRICS.read().job_accepted(job.variant.tag());
        }
        info!(jobs = accepted.jobs.len(), "build request accepted");
        Ok(accepted)
    }

    /// Drops outputs claimed by a submission that is failing. An output
    /// that cannot be dropped keeps the failure on its metadata record.
    async fn release(&self, outputs: &[String], cause: &Error) {
        warn!(outputs = ?outputs, error = %cause, "build request failed after claiming outputs");
        METRICS.read().submission_rejected(cause.kind());
        for output in outputs {
            if let Err(err) = self.store.delete(output).await {
                error!(output = %output, error = %err, "could not release output");
                if let Err(err) = self.registry.record_failure(output, cause).await {
                    error!(output = %output, error = %err, "could not record submission failure");
                }
            }
        }
    }

    pub async fn job_status(&self, output_name: &str) -> Result<JobState> {
        self.registry
            .load(output_name)
            .await?
            .map(|job| job.state())
            .ok_or_else(|| Error::Store(format!("no job named {}", output_name)))
    }

    /// Pages through the stored rows of `output_name` in id order. The
    /// metadata record is never returned.
    pub async fn read_results(
        &self,
        output_name: &str,
        query: &Document,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<Document>> {
        let mut rows = Vec::new();
        for doc in self.store.find(output_name, query).await? {
            let id = document_id(&doc)?;
            if id != SENTINEL_ID {
                rows.push((id, doc));
            }
        }
        rows.sort_by_key(|(id, _)| *id);
        Ok(rows.into_iter().skip(skip).take(limit).map(|(_, doc)| doc).collect())
    }

    /// Refuses new submissions and waits for running batches to finish.
    pub async fn shutdown(&self) -> Result<()> {
        {
            // an in-flight submission either schedules its batch or releases its outputs first
            let _claim = self.submission.lock().await;
            self.pool.close();
        }
        info!(active = self.pool.active_tasks(), "builder shutting down");
        self.pool.shutdown(self.config.shutdown_timeout()).await
    }
}

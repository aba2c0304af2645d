use crate::error::{Error, Result};
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramOpts, HistogramVec,
    TextEncoder,
};
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref JOB_COUNTER: CounterVec = register_counter_vec!(
        "model_builder_jobs_total",
        "Jobs by variant and lifecycle outcome",
        &["variant", "outcome"]
    ).unwrap();

    static ref JOB_FAILURES: CounterVec = register_counter_vec!(
        "model_builder_job_failures_total",
        "Failed jobs by variant and error kind",
        &["variant", "kind"]
    ).unwrap();

    static ref FIT_DURATION: HistogramVec = register_histogram_vec!(
        HistogramOpts::new(
            "model_builder_fit_duration_seconds",
            "Wall-clock time spent fitting one variant"
        ).buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0, 60.0, 600.0]),
        &["variant"]
    ).unwrap();

    static ref ROWS_PERSISTED: CounterVec = register_counter_vec!(
        "model_builder_rows_persisted_total",
        "Prediction rows written to output collections",
        &["variant"]
    ).unwrap();

    static ref REJECTED_SUBMISSIONS: CounterVec = register_counter_vec!(
        "model_builder_rejected_submissions_total",
        "Submissions refused before any job was created",
        &["code"]
    ).unwrap();
}

pub struct MetricsRecorder {
    enabled: bool,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn job_accepted(&self, variant: &str) {
        if self.enabled {
            JOB_COUNTER.with_label_values(&[variant, "accepted"]).inc();
        }
    }

    pub fn job_finished(&self, variant: &str, rows: usize) {
        if self.enabled {
            JOB_COUNTER.with_label_values(&[variant, "finished"]).inc();
            ROWS_PERSISTED.with_label_values(&[variant]).inc_by(rows as f64);
        }
    }

    pub fn job_failed(&self, variant: &str, kind: &str) {
        if self.enabled {
            JOB_COUNTER.with_label_values(&[variant, "failed"]).inc();
            JOB_FAILURES.with_label_values(&[variant, kind]).inc();
        }
    }

    pub fn fit_duration(&self, variant: &str, seconds: f64) {
        if self.enabled {
            FIT_DURATION.with_label_values(&[variant]).observe(seconds);
        }
    }

    pub fn submission_rejected(&self, code: &str) {
        if self.enabled {
            REJECTED_SUBMISSIONS.with_label_values(&[code]).inc();
        }
    }

    /// Prometheus text exposition of every registered collector.
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| Error::Config(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| Error::Config(format!("Failed to convert metrics to string: {}", e)))
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: Arc<parking_lot::RwLock<MetricsRecorder>> =
        Arc::new(parking_lot::RwLock::new(MetricsRecorder::new()));
}

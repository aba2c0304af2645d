//! Builder configuration: defaults, JSON file, then `MODEL_BUILDER_*`
//! environment overrides.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_RESULT_URI_PREFIX: &str = "/api/learningOrchestra/v1/builder/";
pub const DEFAULT_RESULT_URI_QUERY: &str = "?query={}&limit=20&skip=0";
pub const DEFAULT_METADATA_TYPE: &str = "builder/sparkml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Variants allowed to compute at the same time.
    pub worker_threads: usize,
    pub shutdown_timeout_ms: u64,
    pub result_uri_prefix: String,
    pub result_uri_query: String,
    pub metadata_type: String,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            shutdown_timeout_ms: 300_000,
            result_uri_prefix: DEFAULT_RESULT_URI_PREFIX.to_string(),
            result_uri_query: DEFAULT_RESULT_URI_QUERY.to_string(),
            metadata_type: DEFAULT_METADATA_TYPE.to_string(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl BuilderConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("JSON parse error in {}: {}", path.display(), e)))
    }

    /// Applies environment overrides on top of `self`.
    pub fn from_env(self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(workers) = var("MODEL_BUILDER_WORKER_THREADS") {
            self.worker_threads = workers
                .parse()
                .map_err(|_| Error::Config("Invalid worker thread count".into()))?;
        }

        if let Some(timeout) = var("MODEL_BUILDER_SHUTDOWN_TIMEOUT_MS") {
            self.shutdown_timeout_ms = timeout
                .parse()
                .map_err(|_| Error::Config("Invalid shutdown timeout".into()))?;
        }

        if let Some(prefix) = var("MODEL_BUILDER_RESULT_URI_PREFIX") {
            self.result_uri_prefix = prefix;
        }

        if let Some(kind) = var("MODEL_BUILDER_METADATA_TYPE") {
            self.metadata_type = kind;
        }

        if let Some(level) = var("MODEL_BUILDER_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(json) = var("MODEL_BUILDER_LOG_JSON") {
            self.log_json = json
                .parse()
                .map_err(|_| Error::Config("Invalid log JSON flag".into()))?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config("Must allow at least 1 worker thread".into()));
        }

        if self.shutdown_timeout_ms == 0 {
            return Err(Error::Config("Shutdown timeout must be greater than 0".into()));
        }

        if self.result_uri_prefix.is_empty() {
            return Err(Error::Config("Result URI prefix must not be empty".into()));
        }

        if crate::logging::parse_level(&self.log_level).is_none() {
            return Err(Error::Config(format!("Unknown log level {}", self.log_level)));
        }

        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Where a caller can read the rows of `output_name`.
    pub fn result_uri(&self, output_name: &str) -> String {
        format!("{}{}{}", self.result_uri_prefix, output_name, self.result_uri_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = BuilderConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.result_uri("irisTestLR"),
            "/api/learningOrchestra/v1/builder/irisTestLR?query={}&limit=20&skip=0"
        );
    }

    #[test]
    fn test_validation() {
        let bad = [
            BuilderConfig { worker_threads: 0, ..Default::default() },
            BuilderConfig { shutdown_timeout_ms: 0, ..Default::default() },
            BuilderConfig { result_uri_prefix: String::new(), ..Default::default() },
            BuilderConfig { log_level: "loud".into(), ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MODEL_BUILDER_WORKER_THREADS", "3"),
            ("MODEL_BUILDER_LOG_JSON", "true"),
            ("MODEL_BUILDER_METADATA_TYPE", "builder/local"),
        ]
        .into_iter()
        .collect();
        let config = BuilderConfig::default()
            .apply_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.worker_threads, 3);
        assert!(config.log_json);
        assert_eq!(config.metadata_type, "builder/local");

        let err = BuilderConfig::default()
            .apply_vars(|name| (name == "MODEL_BUILDER_WORKER_THREADS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var("MODEL_BUILDER_LOG_LEVEL", "warn");
        std::env::set_var("MODEL_BUILDER_SHUTDOWN_TIMEOUT_MS", "1500");
        let config = BuilderConfig::default().from_env();
        std::env::remove_var("MODEL_BUILDER_LOG_LEVEL");
        std::env::remove_var("MODEL_BUILDER_SHUTDOWN_TIMEOUT_MS");

        let config = config.unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_from_file_uses_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.json");
        std::fs::write(&path, r#"{"worker_threads": 2, "log_level": "debug"}"#).unwrap();

        let config = BuilderConfig::from_file(&path).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.metadata_type, DEFAULT_METADATA_TYPE);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(BuilderConfig::from_file(&path), Err(Error::Config(_))));
    }
}

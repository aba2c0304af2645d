//! Read-only precondition checks run before any job is created.

use crate::error::{Error, Result, ValidationError};
use crate::registry::MetadataRegistry;
use crate::store::DocumentStore;
use crate::variant::{output_name, Variant};
use std::collections::HashSet;
use std::sync::Arc;

pub struct PreconditionValidator {
    store: Arc<dyn DocumentStore>,
    registry: Arc<MetadataRegistry>,
}

impl PreconditionValidator {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<MetadataRegistry>) -> Self {
        Self { store, registry }
    }

    /// Checks, in order: output names are free, inputs exist, variant tags
    /// are known, inputs are fully processed. Stops at the first violation.
    pub async fn validate(&self, tags: &[String], train: &str, test: &str) -> Result<Vec<Variant>> {
        let collections: HashSet<String> = self.store.list_collections().await?.into_iter().collect();

        let mut claimed = HashSet::new();
        for tag in tags {
            let name = output_name(test, tag);
            if collections.contains(&name) || !claimed.insert(name.clone()) {
                return Err(ValidationError::DuplicateOutput(name).into());
            }
        }

        for dataset in [train, test] {
            if !collections.contains(dataset) {
                return Err(ValidationError::UnknownDataset(dataset.to_string()).into());
            }
        }

        if tags.is_empty() {
            return Err(ValidationError::UnknownVariant("<none>".to_string()).into());
        }
        let variants = tags
            .iter()
            .map(|tag| tag.parse::<Variant>())
            .collect::<Result<Vec<_>>>()?;

        for dataset in [train, test] {
            // a sentinel without a boolean finished flag counts as not ready
            let ready = match self.registry.metadata_record(dataset).await {
                Ok(record) => record.is_some_and(|record| record.finished),
                Err(Error::InvalidDocument(_)) => false,
                Err(err) => return Err(err),
            };
            if !ready {
                return Err(ValidationError::InputNotReady(dataset.to_string()).into());
            }
        }

        Ok(variants)
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use model_builder::{
    BuildRequest, BuilderConfig, BuilderService, Classifier, ClassifierSuite, Document,
    DocumentStore, Error, FittedModel, Frame, LocalEngine, MemoryStore, PriorClassifier, Result,
    TransformRegistry, VectorAssembler, EvaluationSource,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const TRANSFORM: &str = "iris-assembler";

/// Store wrapper that keeps the order of every write it sees.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    writes: Mutex<Vec<Write>>,
    failing_inserts: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Insert { collection: String, id: u64 },
    Update { collection: String, fields: Vec<String> },
    Delete { collection: String },
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert into `collection` fail until cleared with `None`.
    pub fn fail_inserts_into(&self, collection: Option<&str>) {
        *self.failing_inserts.lock() = collection.map(str::to_string);
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().clone()
    }

    /// Positions of data row inserts into `collection`, in write order.
    pub fn row_inserts(&self, collection: &str) -> Vec<usize> {
        self.writes()
            .iter()
            .enumerate()
            .filter(|(_, w)| matches!(w, Write::Insert { collection: c, id } if c == collection && *id != 0))
            .map(|(i, _)| i)
            .collect()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        self.inner.find(collection, filter).await
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>> {
        self.inner.find_one(collection, filter).await
    }

    async fn update_one(&self, collection: &str, filter: &Document, patch: &Document) -> Result<bool> {
        let updated = self.inner.update_one(collection, filter, patch).await?;
        self.writes.lock().push(Write::Update {
            collection: collection.to_string(),
            fields: patch.keys().cloned().collect(),
        });
        Ok(updated)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        if self.failing_inserts.lock().as_deref() == Some(collection) {
            return Err(Error::Store("transient write failure".into()));
        }
        let id = document.get("_id").and_then(Value::as_u64).unwrap_or_default();
        self.inner.insert_one(collection, document).await?;
        self.writes.lock().push(Write::Insert {
            collection: collection.to_string(),
            id,
        });
        Ok(())
    }

    async fn delete(&self, collection: &str) -> Result<()> {
        self.inner.delete(collection).await?;
        self.writes.lock().push(Write::Delete {
            collection: collection.to_string(),
        });
        Ok(())
    }
}

/// Prior classifier that takes its time.
pub struct SlowClassifier(pub Duration);

impl Classifier for SlowClassifier {
    fn fit(&self, training: &Frame) -> Result<Box<dyn FittedModel>> {
        std::thread::sleep(self.0);
        PriorClassifier.fit(training)
    }
}

pub struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn fit(&self, _training: &Frame) -> Result<Box<dyn FittedModel>> {
        Err(Error::Engine("training data rejected".into()))
    }
}

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

pub fn iris_rows(count: usize, labelled: bool) -> Vec<Document> {
    const SPECIES: [&str; 3] = ["setosa", "versicolor", "virginica"];
    (0..count)
        .map(|i| {
            let mut row = doc(json!({
                "sepal_length": 4.5 + (i % 7) as f64 * 0.3,
                "sepal_width": 2.5 + (i % 5) as f64 * 0.2,
                "petal_length": 1.0 + (i % 3) as f64 * 2.0,
                "petal_width": 0.2 + (i % 3) as f64 * 0.8,
            }));
            if labelled {
                row.insert("species".into(), json!(SPECIES[i % 3]));
            }
            row
        })
        .collect()
}

/// Seeds finished `irisTrain` and `irisTest` collections.
pub fn seed_iris(store: &MemoryStore, test_rows: usize) {
    store.import_dataset("irisTrain", iris_rows(30, true)).unwrap();
    store.import_dataset("irisTest", iris_rows(test_rows, false)).unwrap();
}

pub fn builder_config(workers: usize) -> BuilderConfig {
    BuilderConfig {
        worker_threads: workers,
        shutdown_timeout_ms: 30_000,
        ..Default::default()
    }
}

pub fn transforms() -> Arc<TransformRegistry> {
    let registry = Arc::new(TransformRegistry::new());
    registry
        .register(Arc::new(
            VectorAssembler::new(TRANSFORM, "species").with_evaluation(EvaluationSource::Holdout { every: 5 }),
        ))
        .unwrap();
    registry
}

pub fn service_over<S: DocumentStore + 'static>(store: Arc<S>, suite: ClassifierSuite, workers: usize) -> BuilderService {
    let engine = Arc::new(LocalEngine::new(store.clone(), suite));
    BuilderService::new(builder_config(workers), store, engine, transforms()).unwrap()
}

pub fn request(variants: &[&str]) -> BuildRequest {
    BuildRequest {
        variants: variants.iter().map(|v| v.to_string()).collect(),
        train_dataset_name: "irisTrain".into(),
        test_dataset_name: "irisTest".into(),
        transform: TRANSFORM.into(),
    }
}

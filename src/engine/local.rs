use super::{
    evaluation, Cell, Classifier, ComputeEngine, FittedModel, Frame, Metric, LABEL_COLUMN,
    PREDICTION_COLUMN, PROBABILITY_COLUMN, RAW_PREDICTION_COLUMN,
};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::store::DocumentStore;
use crate::variant::Variant;
use async_trait::async_trait;
use std::sync::Arc;

/// One training capability per variant, fixed at construction.
#[derive(Clone)]
pub struct ClassifierSuite {
    pub logistic_regression: Arc<dyn Classifier>,
    pub decision_tree: Arc<dyn Classifier>,
    pub random_forest: Arc<dyn Classifier>,
    pub gradient_boosted: Arc<dyn Classifier>,
    pub naive_bayes: Arc<dyn Classifier>,
}

impl ClassifierSuite {
    /// Every variant backed by the same capability.
    pub fn uniform(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            logistic_regression: classifier.clone(),
            decision_tree: classifier.clone(),
            random_forest: classifier.clone(),
            gradient_boosted: classifier.clone(),
            naive_bayes: classifier,
        }
    }

    pub fn with(mut self, variant: Variant, classifier: Arc<dyn Classifier>) -> Self {
        *self.slot_mut(variant) = classifier;
        self
    }

    pub fn classifier(&self, variant: Variant) -> &Arc<dyn Classifier> {
        match variant {
            Variant::LogisticRegression => &self.logistic_regression,
            Variant::DecisionTree => &self.decision_tree,
            Variant::RandomForest => &self.random_forest,
            Variant::GradientBoosted => &self.gradient_boosted,
            Variant::NaiveBayes => &self.naive_bayes,
        }
    }

    fn slot_mut(&mut self, variant: Variant) -> &mut Arc<dyn Classifier> {
        match variant {
            Variant::LogisticRegression => &mut self.logistic_regression,
            Variant::DecisionTree => &mut self.decision_tree,
            Variant::RandomForest => &mut self.random_forest,
            Variant::GradientBoosted => &mut self.gradient_boosted,
            Variant::NaiveBayes => &mut self.naive_bayes,
        }
    }
}

impl Default for ClassifierSuite {
    fn default() -> Self {
        Self::uniform(Arc::new(PriorClassifier))
    }
}

/// Engine that reads datasets straight from a [`DocumentStore`] and runs
/// classifiers in-process.
pub struct LocalEngine {
    store: Arc<dyn DocumentStore>,
    suite: ClassifierSuite,
}

impl LocalEngine {
    pub fn new(store: Arc<dyn DocumentStore>, suite: ClassifierSuite) -> Self {
        Self { store, suite }
    }
}

#[async_trait]
impl ComputeEngine for LocalEngine {
    async fn load(&self, collection: &str) -> Result<Frame> {
        let names = self.store.list_collections().await?;
        if !names.iter().any(|name| name == collection) {
            return Err(Error::Engine(format!("no collection named {}", collection)));
        }
        let documents = self.store.find(collection, &Document::new()).await?;
        Ok(Frame::from_documents(documents))
    }

    fn fit(&self, variant: Variant, training: &Frame) -> Result<Box<dyn FittedModel>> {
        self.suite.classifier(variant).fit(training)
    }

    fn evaluate(&self, predictions: &Frame, metric: Metric) -> Result<f64> {
        evaluation::evaluate(predictions, metric)
    }
}

/// Largest class index a label may carry; probability vectors are dense.
pub const MAX_CLASS_INDEX: usize = u16::MAX as usize;

/// Baseline that predicts the training class distribution for every row.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorClassifier;

impl Classifier for PriorClassifier {
    fn fit(&self, training: &Frame) -> Result<Box<dyn FittedModel>> {
        let mut counts: Vec<f64> = Vec::new();
        for (index, cell) in training.column(LABEL_COLUMN).enumerate() {
            let label = cell
                .and_then(Cell::as_f64)
                .filter(|l| *l >= 0.0 && l.fract() == 0.0)
                .ok_or_else(|| {
                    Error::Engine(format!("row {} has no class index in {}", index, LABEL_COLUMN))
                })?;
            if label > MAX_CLASS_INDEX as f64 {
                return Err(Error::Engine(format!(
                    "row {} has class index {} above the limit of {}",
                    index, label, MAX_CLASS_INDEX
                )));
            }
            let label = label as usize;
            if counts.len() <= label {
                counts.resize(label + 1, 0.0);
            }
            counts[label] += 1.0;
        }
        if counts.is_empty() {
            return Err(Error::Engine("cannot fit on an empty frame".into()));
        }

        let total: f64 = counts.iter().sum();
        let priors = counts.iter().map(|c| c / total).collect();
        // first class wins ties
        let prediction = counts
            .iter()
            .enumerate()
            .fold(0, |best, (i, c)| if *c > counts[best] { i } else { best });

        Ok(Box::new(PriorModel {
            counts,
            priors,
            prediction: prediction as f64,
        }))
    }
}

struct PriorModel {
    counts: Vec<f64>,
    priors: Vec<f64>,
    prediction: f64,
}

impl FittedModel for PriorModel {
    fn transform(&self, frame: &Frame) -> Result<Frame> {
        let rows = frame.len();
        frame
            .clone()
            .with_column(RAW_PREDICTION_COLUMN, vec![Cell::Vector(self.counts.clone()); rows])?
            .with_column(PROBABILITY_COLUMN, vec![Cell::Vector(self.priors.clone()); rows])?
            .with_column(PREDICTION_COLUMN, vec![Cell::from(self.prediction); rows])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Record;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn labelled(labels: &[f64]) -> Frame {
        let rows = labels
            .iter()
            .map(|l| {
                let mut row = Record::new();
                row.insert(LABEL_COLUMN.into(), Cell::from(*l));
                row
            })
            .collect();
        Frame::new(vec![LABEL_COLUMN.into()], rows)
    }

    #[test]
    fn test_prior_classifier() {
        let model = PriorClassifier.fit(&labelled(&[0.0, 2.0, 2.0, 1.0])).unwrap();
        let out = model.transform(&labelled(&[1.0, 0.0])).unwrap();

        assert_eq!(out.len(), 2);
        let row = &out.rows()[0];
        assert_eq!(row[PREDICTION_COLUMN].as_f64(), Some(2.0));
        assert_eq!(row[PROBABILITY_COLUMN].as_vector(), Some(&[0.25, 0.25, 0.5][..]));
        assert_eq!(row[RAW_PREDICTION_COLUMN].as_vector(), Some(&[1.0, 1.0, 2.0][..]));
    }

    #[test]
    fn test_prior_classifier_rejects_bad_labels() {
        assert!(PriorClassifier.fit(&labelled(&[])).is_err());
        assert!(PriorClassifier.fit(&labelled(&[0.5])).is_err());
        assert!(PriorClassifier.fit(&labelled(&[-1.0])).is_err());
    }

    #[test]
    fn test_prior_classifier_bounds_class_index() {
        for label in [1e20, 1e10, (MAX_CLASS_INDEX + 1) as f64] {
            match PriorClassifier.fit(&labelled(&[0.0, label])) {
                Err(Error::Engine(message)) => assert!(message.contains("above the limit")),
                other => panic!("expected engine error for {}, got {:?}", label, other.is_ok()),
            }
        }

        let model = PriorClassifier.fit(&labelled(&[MAX_CLASS_INDEX as f64])).unwrap();
        let out = model.transform(&labelled(&[0.0])).unwrap();
        assert_eq!(out.rows()[0][PREDICTION_COLUMN].as_f64(), Some(MAX_CLASS_INDEX as f64));
    }

    struct Failing;

    impl Classifier for Failing {
        fn fit(&self, _training: &Frame) -> Result<Box<dyn FittedModel>> {
            Err(Error::Engine("no convergence".into()))
        }
    }

    #[tokio::test]
    async fn test_local_engine_dispatch() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_one("d", json!({"_id": 1, "label": 0.0}).as_object().cloned().unwrap())
            .await
            .unwrap();

        let suite = ClassifierSuite::default().with(Variant::GradientBoosted, Arc::new(Failing));
        let engine = LocalEngine::new(store, suite);

        let frame = engine.load("d").await.unwrap();
        assert_eq!(frame.len(), 1);
        assert!(engine.load("missing").await.is_err());

        assert!(engine.fit(Variant::LogisticRegression, &frame).is_ok());
        assert!(engine.fit(Variant::GradientBoosted, &frame).is_err());
    }
}

use super::transform::{
    FeatureTransform, TransformOutputs, EVALUATION_OUTPUT, TESTING_OUTPUT, TRAINING_OUTPUT,
};
use crate::engine::{Cell, Frame, FEATURES_COLUMN, LABEL_COLUMN};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Where the evaluation artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    None,
    /// The assembled testing frame; every testing row must be labelled.
    Testing,
    /// Every n-th training row is held out.
    Holdout { every: usize },
}

/// Assembles numeric columns into a `features` vector and a numeric `label`.
///
/// String labels are indexed by their sorted distinct values across both
/// inputs, so training and testing agree on class indices.
#[derive(Debug, Clone)]
pub struct VectorAssembler {
    name: String,
    input_columns: Vec<String>,
    label_column: String,
    evaluation: EvaluationSource,
}

impl VectorAssembler {
    pub fn new(name: impl Into<String>, label_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_columns: Vec::new(),
            label_column: label_column.into(),
            evaluation: EvaluationSource::None,
        }
    }

    /// Restricts features to `columns`. By default every numeric column
    /// except the label is used.
    pub fn with_input_columns(mut self, columns: Vec<String>) -> Self {
        self.input_columns = columns;
        self
    }

    pub fn with_evaluation(mut self, evaluation: EvaluationSource) -> Self {
        self.evaluation = evaluation;
        self
    }

    fn feature_columns(&self, training: &Frame) -> Result<Vec<String>> {
        if !self.input_columns.is_empty() {
            return Ok(self.input_columns.clone());
        }
        let columns: Vec<String> = training
            .columns()
            .iter()
            .filter(|c| **c != self.label_column && c.as_str() != FEATURES_COLUMN)
            .filter(|c| {
                training
                    .column(c)
                    .all(|cell| cell.map_or(true, |cell| cell.as_f64().is_some()))
            })
            .cloned()
            .collect();
        if columns.is_empty() {
            return Err(Error::Pipeline("no numeric feature columns to assemble".into()));
        }
        Ok(columns)
    }

    fn label_index(&self, frames: [&Frame; 2]) -> HashMap<String, f64> {
        let names: BTreeSet<&str> = frames
            .iter()
            .flat_map(|frame| frame.column(&self.label_column))
            .filter_map(|cell| cell.and_then(Cell::as_str))
            .collect();
        names
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index as f64))
            .collect()
    }

    fn assemble(
        &self,
        frame: Frame,
        columns: &[String],
        labels: &HashMap<String, f64>,
        require_label: bool,
    ) -> Result<Frame> {
        let mut features = Vec::with_capacity(frame.len());
        let mut label_cells = Vec::with_capacity(frame.len());
        for (index, row) in frame.rows().iter().enumerate() {
            let vector = columns
                .iter()
                .map(|column| {
                    row.get(column).and_then(Cell::as_f64).ok_or_else(|| {
                        Error::Pipeline(format!("row {} has no numeric value for {}", index, column))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            features.push(Cell::Vector(vector));

            let label = row.get(&self.label_column).and_then(|cell| match cell.as_str() {
                Some(name) => labels.get(name).copied(),
                None => cell.as_f64(),
            });
            match label {
                Some(label) => label_cells.push(Cell::from(label)),
                None if require_label => {
                    return Err(Error::Pipeline(format!(
                        "row {} has no usable {}",
                        index, self.label_column
                    )))
                }
                None => label_cells.push(Cell::Value(serde_json::Value::Null)),
            }
        }

        let frame = frame.with_column(FEATURES_COLUMN, features)?;
        if !require_label && label_cells.iter().all(|c| matches!(c, Cell::Value(serde_json::Value::Null))) {
            return Ok(frame);
        }
        frame.with_column(LABEL_COLUMN, label_cells)
    }
}

impl FeatureTransform for VectorAssembler {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, training: Frame, testing: Frame) -> Result<TransformOutputs> {
        let columns = self.feature_columns(&training)?;
        let labels = self.label_index([&training, &testing]);

        let (training, evaluation) = match self.evaluation {
            EvaluationSource::None => (self.assemble(training, &columns, &labels, true)?, None),
            EvaluationSource::Testing => (
                self.assemble(training, &columns, &labels, true)?,
                Some(self.assemble(testing.clone(), &columns, &labels, true)?),
            ),
            EvaluationSource::Holdout { every } => {
                if every < 2 {
                    return Err(Error::Pipeline(format!("holdout every {} leaves no training rows", every)));
                }
                let (kept, held_out) = training.split_by_index(|i| i % every == 0);
                (
                    self.assemble(kept, &columns, &labels, true)?,
                    Some(self.assemble(held_out, &columns, &labels, true)?),
                )
            }
        };
        let testing = self.assemble(testing, &columns, &labels, false)?;

        let mut outputs = TransformOutputs::new();
        outputs.insert(TRAINING_OUTPUT.to_string(), Some(training));
        outputs.insert(TESTING_OUTPUT.to_string(), Some(testing));
        outputs.insert(EVALUATION_OUTPUT.to_string(), evaluation);
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn frame(values: Vec<Value>) -> Frame {
        Frame::from_documents(values.into_iter().map(|v| v.as_object().cloned().unwrap()).collect())
    }

    fn iris() -> (Frame, Frame) {
        let train = frame(vec![
            json!({"width": 1.0, "length": 2.0, "species": "setosa"}),
            json!({"width": 3.0, "length": 4.0, "species": "virginica"}),
            json!({"width": 5.0, "length": 6.0, "species": "setosa"}),
            json!({"width": 7.0, "length": 8.0, "species": "versicolor"}),
        ]);
        let test = frame(vec![
            json!({"width": 1.5, "length": 2.5, "species": "virginica"}),
            json!({"width": 2.5, "length": 3.5}),
        ]);
        (train, test)
    }

    #[test]
    fn test_assembles_numeric_columns_and_indexes_labels() {
        let (train, test) = iris();
        let outputs = VectorAssembler::new("assemble", "species").apply(train, test).unwrap();

        let training = outputs[TRAINING_OUTPUT].clone().unwrap();
        let row = &training.rows()[1];
        // columns come out sorted: length, width
        assert_eq!(row[FEATURES_COLUMN].as_vector(), Some(&[4.0, 3.0][..]));
        // setosa=0 versicolor=1 virginica=2
        assert_eq!(row[LABEL_COLUMN].as_f64(), Some(2.0));
        assert_eq!(training.rows()[3][LABEL_COLUMN].as_f64(), Some(1.0));

        let testing = outputs[TESTING_OUTPUT].clone().unwrap();
        assert_eq!(testing.len(), 2);
        assert_eq!(testing.rows()[0][LABEL_COLUMN].as_f64(), Some(2.0));
        assert!(outputs[EVALUATION_OUTPUT].is_none());
    }

    #[test]
    fn test_holdout_evaluation() {
        let (train, test) = iris();
        let outputs = VectorAssembler::new("assemble", "species")
            .with_evaluation(EvaluationSource::Holdout { every: 2 })
            .apply(train, test)
            .unwrap();

        assert_eq!(outputs[TRAINING_OUTPUT].as_ref().unwrap().len(), 2);
        assert_eq!(outputs[EVALUATION_OUTPUT].as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_testing_evaluation_requires_labels() {
        let (train, test) = iris();
        let err = VectorAssembler::new("assemble", "species")
            .with_evaluation(EvaluationSource::Testing)
            .apply(train, test)
            .unwrap_err();
        assert_eq!(err.kind(), "pipeline-error");
    }

    #[test]
    fn test_explicit_columns_must_be_numeric() {
        let (train, test) = iris();
        let err = VectorAssembler::new("assemble", "species")
            .with_input_columns(vec!["species".into()])
            .apply(train, test)
            .unwrap_err();
        assert!(matches!(err, Error::Pipeline(_)));
    }
}

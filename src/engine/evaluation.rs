use super::{Cell, Frame, Metric, LABEL_COLUMN, PREDICTION_COLUMN};
use crate::error::{Error, Result};
use std::collections::HashMap;

pub fn evaluate(frame: &Frame, metric: Metric) -> Result<f64> {
    let pairs = label_prediction_pairs(frame)?;
    Ok(match metric {
        Metric::Accuracy => accuracy(&pairs),
        Metric::F1 => weighted_f1(&pairs),
    })
}

fn label_prediction_pairs(frame: &Frame) -> Result<Vec<(f64, f64)>> {
    if frame.is_empty() {
        return Err(Error::Engine("cannot evaluate an empty frame".into()));
    }
    frame
        .rows()
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let label = row.get(LABEL_COLUMN).and_then(Cell::as_f64);
            let prediction = row.get(PREDICTION_COLUMN).and_then(Cell::as_f64);
            match (label, prediction) {
                (Some(label), Some(prediction)) => Ok((label, prediction)),
                _ => Err(Error::Engine(format!(
                    "row {} lacks numeric {} and {}",
                    index, LABEL_COLUMN, PREDICTION_COLUMN
                ))),
            }
        })
        .collect()
}

fn accuracy(pairs: &[(f64, f64)]) -> f64 {
    let correct = pairs.iter().filter(|(label, prediction)| label == prediction).count();
    correct as f64 / pairs.len() as f64
}

#[derive(Default)]
struct ClassCounts {
    support: usize,
    true_positive: usize,
    predicted: usize,
}

fn weighted_f1(pairs: &[(f64, f64)]) -> f64 {
    let mut classes: HashMap<u64, ClassCounts> = HashMap::new();
    for (label, prediction) in pairs {
        let entry = classes.entry(label.to_bits()).or_default();
        entry.support += 1;
        if label == prediction {
            entry.true_positive += 1;
        }
        classes.entry(prediction.to_bits()).or_default().predicted += 1;
    }

    let total = pairs.len() as f64;
    classes
        .values()
        .filter(|counts| counts.support > 0)
        .map(|counts| {
            let precision = if counts.predicted == 0 {
                0.0
            } else {
                counts.true_positive as f64 / counts.predicted as f64
            };
            let recall = counts.true_positive as f64 / counts.support as f64;
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            f1 * counts.support as f64 / total
        })
        .sum()
}

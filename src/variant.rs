//! Classifier variants accepted by the builder.

use crate::error::{Error, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed set of classifier kinds. The wire tag is the two letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "LR")]
    LogisticRegression,
    #[serde(rename = "DT")]
    DecisionTree,
    #[serde(rename = "RF")]
    RandomForest,
    #[serde(rename = "GB")]
    GradientBoosted,
    #[serde(rename = "NB")]
    NaiveBayes,
}

impl Variant {
    pub const ALL: [Variant; 5] = [
        Variant::LogisticRegression,
        Variant::DecisionTree,
        Variant::RandomForest,
        Variant::GradientBoosted,
        Variant::NaiveBayes,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Variant::LogisticRegression => "LR",
            Variant::DecisionTree => "DT",
            Variant::RandomForest => "RF",
            Variant::GradientBoosted => "GB",
            Variant::NaiveBayes => "NB",
        }
    }

    /// Output collection name for predictions of `test_dataset` under this variant.
    pub fn output_name(&self, test_dataset: &str) -> String {
        output_name(test_dataset, self.tag())
    }
}

/// Output names are derived from raw tags so duplicate checks can run
/// before the tags themselves are validated.
pub fn output_name(test_dataset: &str, tag: &str) -> String {
    format!("{}{}", test_dataset, tag)
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Variant::ALL
            .iter()
            .copied()
            .find(|v| v.tag() == s)
            .ok_or_else(|| ValidationError::UnknownVariant(s.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for variant in Variant::ALL {
            assert_eq!(variant.tag().parse::<Variant>().unwrap(), variant);
        }
    }

    #[test]
    fn test_unknown_tag() {
        let err = "XX".parse::<Variant>().unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnknownVariant(ref tag)) if tag == "XX"
        ));
        // tags are case sensitive
        assert!("lr".parse::<Variant>().is_err());
    }

    #[test]
    fn test_output_name() {
        assert_eq!(Variant::LogisticRegression.output_name("irisTest"), "irisTestLR");
        assert_eq!(Variant::RandomForest.output_name("irisTest"), "irisTestRF");
    }

    #[test]
    fn test_serde_tag() {
        let json = serde_json::to_string(&Variant::NaiveBayes).unwrap();
        assert_eq!(json, "\"NB\"");
        let parsed: Variant = serde_json::from_str("\"GB\"").unwrap();
        assert_eq!(parsed, Variant::GradientBoosted);
    }
}

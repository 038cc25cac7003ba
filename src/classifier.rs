//! Classifier - linear model inference over a 4-element feature vector
//!
//! The trained artifact is a JSON export of a logistic regression:
//! one coefficient row and one intercept per class.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of input measurements
pub const FEATURE_COUNT: usize = 4;

pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier has no classes")]
    Empty,

    #[error("expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("classifier produced non-finite probabilities")]
    NonFinite,
}

/// Anything that turns a feature vector into per-class probabilities.
pub trait Classifier: Send + Sync {
    fn n_classes(&self) -> usize;

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ClassifierError>;

    /// Predicted class index and the probability vector it was taken from.
    fn classify(&self, features: &FeatureVector) -> Result<(usize, Vec<f64>), ClassifierError> {
        let probabilities = self.predict_proba(features)?;
        let index = argmax(&probabilities).ok_or(ClassifierError::Empty)?;
        Ok((index, probabilities))
    }
}

/// First index holding the maximum value.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MultiClass {
    #[default]
    Multinomial,
    Ovr,
}

/// On-disk shape of the logistic regression artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegressionArtifact {
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    #[serde(default)]
    pub multi_class: MultiClass,
}

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    coef: Vec<FeatureVector>,
    intercept: Vec<f64>,
    multi_class: MultiClass,
}

impl LogisticRegression {
    pub fn from_artifact(artifact: LogisticRegressionArtifact) -> Result<Self, ClassifierError> {
        if artifact.coef.is_empty() {
            return Err(ClassifierError::Empty);
        }
        if artifact.intercept.len() != artifact.coef.len() {
            return Err(ClassifierError::ShapeMismatch {
                expected: artifact.coef.len(),
                actual: artifact.intercept.len(),
            });
        }

        let coef = artifact
            .coef
            .into_iter()
            .map(|row| {
                let actual = row.len();
                FeatureVector::try_from(row).map_err(|_| ClassifierError::ShapeMismatch {
                    expected: FEATURE_COUNT,
                    actual,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            coef,
            intercept: artifact.intercept,
            multi_class: artifact.multi_class,
        })
    }

    fn decision_function(&self, features: &FeatureVector) -> Vec<f64> {
        let scale = features.iter().fold(1.0_f64, |m, x| m.max(x.abs()));
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| {
                let dot: f64 = row.iter().zip(features).map(|(w, x)| w * x).sum();
                if dot.is_nan() && scale.is_finite() {
                    // Opposite-signed terms overflowed; redo the sum on inputs
                    // scaled into [-1, 1] so the result saturates to a signed infinity.
                    let scaled: f64 = row.iter().zip(features).map(|(w, x)| w * (x / scale)).sum();
                    scaled * scale + b
                } else {
                    dot + b
                }
            })
            .collect()
    }
}

impl Classifier for LogisticRegression {
    fn n_classes(&self) -> usize {
        // A single coefficient row is the binary case
        if self.coef.len() == 1 { 2 } else { self.coef.len() }
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ClassifierError> {
        let scores = self.decision_function(features);

        let probabilities = match (scores.as_slice(), self.multi_class) {
            ([d], MultiClass::Ovr) => {
                let p = sigmoid(*d);
                vec![1.0 - p, p]
            }
            ([d], MultiClass::Multinomial) => softmax(&[-d, *d]),
            (_, MultiClass::Multinomial) => softmax(&scores),
            (_, MultiClass::Ovr) => {
                let raw: Vec<f64> = scores.iter().map(|&s| sigmoid(s)).collect();
                normalize(&raw)
            }
        };

        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::NonFinite);
        }
        Ok(probabilities)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax that tolerates infinite scores: `+inf` entries share all of the
/// mass and `-inf` entries get none.
fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::INFINITY {
        let winners: Vec<f64> = scores
            .iter()
            .map(|&s| if s == f64::INFINITY { 1.0 } else { 0.0 })
            .collect();
        return normalize(&winners);
    }
    let exps: Vec<f64> = scores
        .iter()
        .map(|&s| if s == f64::NEG_INFINITY { 0.0 } else { (s - max).exp() })
        .collect();
    normalize(&exps)
}

/// Scale to unit sum. An all-zero input becomes uniform.
fn normalize(values: &[f64]) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum == 0.0 {
        let n = values.len() as f64;
        return values.iter().map(|_| 1.0 / n).collect();
    }
    values.iter().map(|v| v / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iris_like(multi_class: MultiClass) -> LogisticRegression {
        LogisticRegression::from_artifact(LogisticRegressionArtifact {
            coef: vec![
                vec![-0.42, 0.97, -2.40, -1.02],
                vec![0.53, -0.32, -0.21, -0.94],
                vec![-0.11, -0.65, 2.61, 1.96],
            ],
            intercept: vec![9.85, 2.24, -12.09],
            multi_class,
        })
        .unwrap()
    }

    #[test]
    fn multinomial_probabilities_sum_to_one() {
        let model = iris_like(MultiClass::Multinomial);
        let (index, probs) = model.classify(&[5.1, 3.5, 1.4, 0.2]).unwrap();

        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(index, 0);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn ovr_probabilities_sum_to_one() {
        let model = iris_like(MultiClass::Ovr);
        let (index, probs) = model.classify(&[6.7, 3.0, 5.2, 2.3]).unwrap();

        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(index, 2);
    }

    #[test]
    fn binary_model_reports_two_classes() {
        let model = LogisticRegression::from_artifact(LogisticRegressionArtifact {
            coef: vec![vec![1.0, 0.0, 0.0, 0.0]],
            intercept: vec![0.0],
            multi_class: MultiClass::Ovr,
        })
        .unwrap();

        assert_eq!(model.n_classes(), 2);
        let probs = model.predict_proba(&[0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(probs, vec![0.5, 0.5]);
    }

    #[test]
    fn rejects_wrong_row_width() {
        let err = LogisticRegression::from_artifact(LogisticRegressionArtifact {
            coef: vec![vec![1.0, 2.0, 3.0]],
            intercept: vec![0.0],
            multi_class: MultiClass::Multinomial,
        })
        .unwrap_err();

        assert!(matches!(err, ClassifierError::ShapeMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn rejects_intercept_mismatch() {
        let err = LogisticRegression::from_artifact(LogisticRegressionArtifact {
            coef: vec![vec![0.0; 4], vec![0.0; 4]],
            intercept: vec![0.0],
            multi_class: MultiClass::Multinomial,
        })
        .unwrap_err();

        assert!(matches!(err, ClassifierError::ShapeMismatch { .. }));
    }

    #[test]
    fn argmax_takes_first_maximum() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn huge_inputs_do_not_produce_nan() {
        let model = iris_like(MultiClass::Multinomial);
        let probs = model.predict_proba(&[1e6, 1e6, 1e6, 1e6]).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn overflowing_scores_saturate_instead_of_failing() {
        for multi_class in [MultiClass::Multinomial, MultiClass::Ovr] {
            let model = iris_like(multi_class);
            let (index, probs) = model.classify(&[1e308; 4]).unwrap();
            assert_eq!(index, 2);
            assert_eq!(probs, vec![0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn cancelling_overflow_does_not_yield_nan() {
        let model = LogisticRegression::from_artifact(LogisticRegressionArtifact {
            coef: vec![vec![2.0, -2.0, 0.0, 0.0]],
            intercept: vec![0.0],
            multi_class: MultiClass::Ovr,
        })
        .unwrap();

        let probs = model.predict_proba(&[1e308, 1e308, 0.0, 0.0]).unwrap();
        assert_eq!(probs, vec![0.5, 0.5]);
    }

    #[test]
    fn softmax_splits_tied_infinities() {
        assert_eq!(softmax(&[f64::INFINITY, 1.0, f64::INFINITY]), vec![0.5, 0.0, 0.5]);
        assert_eq!(softmax(&[f64::NEG_INFINITY, 0.0]), vec![0.0, 1.0]);
        assert_eq!(softmax(&[f64::NEG_INFINITY; 2]), vec![0.5, 0.5]);
    }

    #[test]
    fn non_finite_input_is_an_error() {
        let model = iris_like(MultiClass::Multinomial);
        let err = model.predict_proba(&[f64::NAN, 1.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, ClassifierError::NonFinite));
    }
}

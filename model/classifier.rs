//! The stage classifier capability and the shipped logistic implementation.
//!
//! The estimator treats a classifier as an opaque scoring capability: a
//! fitted object that turns a feature vector into the probability of its
//! positive class. Modeling the capability as a trait lets the test suite
//! substitute deterministic stubs for the fitted artifact.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error(
        "Feature vector has {found} entries, but the classifier was fitted on {expected}. \
         This indicates an artifact/code mismatch, not a user input problem."
    )]
    DimensionMismatch { expected: usize, found: usize },
}

/// A fitted binary probabilistic classifier.
///
/// `score` is deterministic for a fixed artifact and input; there is no
/// randomness at inference time. Implementations must reject vectors whose
/// arity differs from the fitted arity.
pub trait Classifier {
    /// The feature-vector arity fixed at training time.
    fn dimension(&self) -> usize;

    /// The probability of the positive class, in [0, 1].
    fn score(&self, features: ArrayView1<f64>) -> Result<f64, ClassifierError>;
}

/// Logistic-regression artifact: one weight per feature plus an intercept,
/// scored through the sigmoid link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Array1<f64>,
    pub intercept: f64,
}

impl Classifier for LogisticModel {
    fn dimension(&self) -> usize {
        self.weights.len()
    }

    fn score(&self, features: ArrayView1<f64>) -> Result<f64, ClassifierError> {
        if features.len() != self.weights.len() {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.weights.len(),
                found: features.len(),
            });
        }

        let eta = self.weights.dot(&features) + self.intercept;
        // Clamp eta to prevent numerical overflow in exp(), and keep the
        // resulting probability away from exact 0 and 1.
        let eta = eta.clamp(-700.0, 700.0);
        let p = 1.0 / (1.0 + f64::exp(-eta));
        Ok(p.clamp(1e-8, 1.0 - 1e-8))
    }
}

//! Fitted preprocessing artifacts: categorical label encoders and the
//! numeric scaler. Both are produced by the training pipeline and loaded
//! read-only; nothing here fits or refits anything.

use crate::data::FieldName;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while applying a fitted transform to a record value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error(
        "The value '{label}' for field '{field}' was not seen during training. \
         Supported values are fixed by the trained artifact; pick one of its categories."
    )]
    UnknownCategory { field: FieldName, label: String },
}

/// A fitted mapping from a categorical field's labels to integer codes.
///
/// The vocabulary is stored in code order: a label's code is its index in
/// `labels`, exactly as the training pipeline's label encoders assigned
/// them. Codes are arbitrary identifiers, not magnitudes; they only have
/// meaning as classifier input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub field: FieldName,
    pub labels: Vec<String>,
}

impl CategoricalEncoder {
    /// Maps a label to its fitted integer code.
    ///
    /// The mapping is total over the fitted vocabulary and nothing else:
    /// an unseen label is a hard `UnknownCategory` error, never a guess
    /// or a silent fallback bucket.
    pub fn encode(&self, label: &str) -> Result<usize, TransformError> {
        self.labels
            .iter()
            .position(|known| known == label)
            .ok_or_else(|| TransformError::UnknownCategory {
                field: self.field,
                label: label.to_string(),
            })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.labels.len()
    }
}

/// A fitted affine transform standardizing the numeric age field:
/// `scaled = (value - mean) / scale`.
///
/// No range restriction is enforced here; values outside the training range
/// extrapolate through the same affine map. Range policy belongs to the
/// input boundary. `scale` is guaranteed non-zero by artifact validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub field: FieldName,
    pub mean: f64,
    pub scale: f64,
}

impl NumericScaler {
    pub fn scale(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

//! # Stage Artifact Bundles
//!
//! Each classifier stage ships as one self-contained, human-readable TOML
//! document: the fitted classifier together with the exact preprocessing
//! artifacts it was trained behind. The two stages were fitted on different
//! case populations (all cases vs. resolved cases only), so their encoders
//! can assign different codes to the same label; an encoder must never be
//! applied on behalf of the other stage's classifier, and keeping each
//! stage's artifacts in one bundle makes that mix-up unrepresentable.
//!
//! The bundle also makes the feature-vector binding order an explicit,
//! versioned part of the artifact (`field_order`) instead of an implicit
//! agreement between training code and inference code. Every structural
//! invariant is checked once, at load time, before any inference can run.

use crate::classifier::{Classifier, LogisticModel};
use crate::data::{FieldName, RECORD_FIELDS};
use crate::transform::{CategoricalEncoder, NumericScaler};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// The artifact document format this build reads and writes. Bumped on any
/// incompatible change to the schema below.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Which role a bundle plays in the two-stage composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stage A: resolved vs. still missing, fitted on all cases.
    Resolution,
    /// Stage B: found alive vs. deceased, fitted on resolved cases only.
    Outcome,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolution => f.write_str("resolution"),
            Stage::Outcome => f.write_str("outcome"),
        }
    }
}

/// Custom error type for artifact loading, saving, and validation.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read or write artifact file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML artifact file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize artifact to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error(
        "Artifact has schema version {found}, but this build supports version {supported}. \
         Re-export the artifact from the training pipeline."
    )]
    UnsupportedSchemaVersion { found: u32, supported: u32 },
    #[error("Expected a {expected} stage artifact, but the file declares itself as {found}.")]
    WrongStage { expected: Stage, found: Stage },
    #[error(
        "The artifact's field_order must name each of the record fields exactly once; \
         field '{0}' is missing or duplicated."
    )]
    MalformedFieldOrder(FieldName),
    #[error("No encoder present for categorical field '{0}'.")]
    EncoderMissing(FieldName),
    #[error(
        "Encoder present for field '{0}', which is not a categorical field of this artifact's \
         field_order, or is covered twice."
    )]
    EncoderUnexpected(FieldName),
    #[error("Encoder for field '{0}' has an empty vocabulary.")]
    EmptyVocabulary(FieldName),
    #[error("The scaler is fitted for field '{found}', but the numeric field is '{expected}'.")]
    ScalerFieldMismatch { expected: FieldName, found: FieldName },
    #[error("The scaler's scale parameter is {0}; it must be finite and non-zero.")]
    DegenerateScale(f64),
    #[error("The classifier's '{0}' parameter contains a non-finite value.")]
    NonFiniteParameter(&'static str),
    #[error(
        "The classifier was fitted on {expected} features, but field_order binds {found}. \
         The artifact is internally inconsistent."
    )]
    DimensionMismatch { expected: usize, found: usize },
}

/// The complete, self-contained artifact for one classifier stage.
///
/// `C` is the shipped `LogisticModel` in production; tests substitute stub
/// classifiers through the same structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifacts<C = LogisticModel> {
    pub schema_version: u32,
    pub stage: Stage,
    /// The exact feature-vector binding order the classifier expects.
    pub field_order: Vec<FieldName>,
    /// One encoder per categorical field in `field_order`.
    pub encoders: Vec<CategoricalEncoder>,
    /// The scaler for the numeric age field.
    pub scaler: NumericScaler,
    pub classifier: C,
}

impl<C: Classifier> StageArtifacts<C> {
    /// Checks every structural invariant of the bundle. Invoked by `load`,
    /// and again by the estimator's constructor so that in-memory bundles
    /// get the same scrutiny as ones read from disk.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(ArtifactError::UnsupportedSchemaVersion {
                found: self.schema_version,
                supported: ARTIFACT_SCHEMA_VERSION,
            });
        }

        // field_order must be a permutation of the record fields. The field
        // set is closed, so per-field counts of exactly one imply it.
        for field in RECORD_FIELDS {
            if self.field_order.iter().filter(|&&f| f == field).count() != 1 {
                return Err(ArtifactError::MalformedFieldOrder(field));
            }
        }

        // Exactly one encoder per categorical field, none elsewhere.
        for field in self.field_order.iter().copied().filter(FieldName::is_categorical) {
            match self.encoders.iter().filter(|e| e.field == field).count() {
                0 => return Err(ArtifactError::EncoderMissing(field)),
                1 => {}
                _ => return Err(ArtifactError::EncoderUnexpected(field)),
            }
        }
        for encoder in &self.encoders {
            if !encoder.field.is_categorical() {
                return Err(ArtifactError::EncoderUnexpected(encoder.field));
            }
            if encoder.labels.is_empty() {
                return Err(ArtifactError::EmptyVocabulary(encoder.field));
            }
        }

        if self.scaler.field != FieldName::ApproximateAge {
            return Err(ArtifactError::ScalerFieldMismatch {
                expected: FieldName::ApproximateAge,
                found: self.scaler.field,
            });
        }
        if !self.scaler.scale.is_finite() || self.scaler.scale == 0.0 {
            return Err(ArtifactError::DegenerateScale(self.scaler.scale));
        }
        if !self.scaler.mean.is_finite() {
            return Err(ArtifactError::NonFiniteParameter("scaler.mean"));
        }

        if self.classifier.dimension() != self.field_order.len() {
            return Err(ArtifactError::DimensionMismatch {
                expected: self.classifier.dimension(),
                found: self.field_order.len(),
            });
        }

        Ok(())
    }

    /// The encoder fitted for `field`, if the bundle carries one.
    pub fn encoder_for(&self, field: FieldName) -> Option<&CategoricalEncoder> {
        self.encoders.iter().find(|e| e.field == field)
    }
}

impl StageArtifacts<LogisticModel> {
    /// Loads and validates a stage artifact from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let toml_string = fs::read_to_string(path)?;
        let artifacts: Self = toml::from_str(&toml_string)?;
        if artifacts.classifier.weights.iter().any(|w| !w.is_finite()) {
            return Err(ArtifactError::NonFiniteParameter("classifier.weights"));
        }
        if !artifacts.classifier.intercept.is_finite() {
            return Err(ArtifactError::NonFiniteParameter("classifier.intercept"));
        }
        artifacts.validate()?;
        log::info!(
            "Loaded {} stage artifacts: {} features, vocabularies: {}",
            artifacts.stage,
            artifacts.field_order.len(),
            artifacts
                .encoders
                .iter()
                .map(|e| format!("{}={}", e.field, e.vocabulary_size()))
                .join(", ")
        );
        Ok(artifacts)
    }

    /// Saves the stage artifact to a file in a human-readable TOML format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::NamedTempFile;

    fn small_bundle(stage: Stage) -> StageArtifacts<LogisticModel> {
        StageArtifacts {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            stage,
            field_order: RECORD_FIELDS.to_vec(),
            encoders: vec![
                CategoricalEncoder {
                    field: FieldName::Sex,
                    labels: vec!["HOMBRE".into(), "MUJER".into()],
                },
                CategoricalEncoder {
                    field: FieldName::Province,
                    labels: vec!["AZUAY".into(), "GUAYAS".into(), "PICHINCHA".into()],
                },
                CategoricalEncoder {
                    field: FieldName::Nationality,
                    labels: vec!["COLOMBIA".into(), "ECUADOR".into()],
                },
                CategoricalEncoder {
                    field: FieldName::Ethnicity,
                    labels: vec!["INDIGENA".into(), "MESTIZO/A".into()],
                },
            ],
            scaler: NumericScaler {
                field: FieldName::ApproximateAge,
                mean: 24.0,
                scale: 16.0,
            },
            classifier: LogisticModel {
                weights: array![0.2, -0.1, 0.05, 0.3, -0.25],
                intercept: 0.4,
            },
        }
    }

    #[test]
    fn valid_bundle_passes_validation() {
        small_bundle(Stage::Resolution).validate().unwrap();
    }

    #[test]
    fn toml_round_trip_preserves_the_bundle() {
        let bundle = small_bundle(Stage::Outcome);
        let file = NamedTempFile::new().unwrap();
        bundle.save(file.path()).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert!(written.contains("schema_version"));
        assert!(written.contains("field_order"));
        assert!(written.contains("PICHINCHA"));

        let reloaded = StageArtifacts::load(file.path()).unwrap();
        assert_eq!(reloaded.stage, Stage::Outcome);
        assert_eq!(reloaded.field_order, bundle.field_order);
        assert_eq!(reloaded.encoders, bundle.encoders);
        assert_eq!(reloaded.scaler, bundle.scaler);
        assert_eq!(reloaded.classifier, bundle.classifier);
    }

    #[test]
    fn json_round_trip_preserves_the_bundle() {
        let bundle = small_bundle(Stage::Resolution);
        let json = serde_json::to_string(&bundle).unwrap();
        let reloaded: StageArtifacts<LogisticModel> = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.classifier, bundle.classifier);
        assert_eq!(reloaded.encoders, bundle.encoders);
    }

    #[test]
    fn future_schema_version_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.schema_version = ARTIFACT_SCHEMA_VERSION + 1;
        let err = bundle.validate().unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::UnsupportedSchemaVersion { found, .. } if found == ARTIFACT_SCHEMA_VERSION + 1
        ));
    }

    #[test]
    fn missing_field_in_order_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.field_order.retain(|&f| f != FieldName::Ethnicity);
        let err = bundle.validate().unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::MalformedFieldOrder(FieldName::Ethnicity)
        ));
    }

    #[test]
    fn duplicated_field_in_order_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.field_order.push(FieldName::Sex);
        let err = bundle.validate().unwrap_err();
        assert!(matches!(err, ArtifactError::MalformedFieldOrder(FieldName::Sex)));
    }

    #[test]
    fn missing_encoder_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.encoders.retain(|e| e.field != FieldName::Province);
        let err = bundle.validate().unwrap_err();
        assert!(matches!(err, ArtifactError::EncoderMissing(FieldName::Province)));
    }

    #[test]
    fn encoder_for_numeric_field_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.encoders.push(CategoricalEncoder {
            field: FieldName::ApproximateAge,
            labels: vec!["0".into()],
        });
        let err = bundle.validate().unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::EncoderUnexpected(FieldName::ApproximateAge)
        ));
    }

    #[test]
    fn empty_vocabulary_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.encoders[1].labels.clear();
        let err = bundle.validate().unwrap_err();
        assert!(matches!(err, ArtifactError::EmptyVocabulary(FieldName::Province)));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.scaler.scale = 0.0;
        let err = bundle.validate().unwrap_err();
        assert!(matches!(err, ArtifactError::DegenerateScale(s) if s == 0.0));
    }

    #[test]
    fn scaler_for_wrong_field_is_rejected() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.scaler.field = FieldName::Sex;
        let err = bundle.validate().unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::ScalerFieldMismatch {
                found: FieldName::Sex,
                ..
            }
        ));
    }

    #[test]
    fn classifier_arity_mismatch_is_rejected_at_validation() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.classifier.weights = array![0.1, 0.2];
        let err = bundle.validate().unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::DimensionMismatch {
                expected: 2,
                found: 5
            }
        ));
    }

    #[test]
    fn non_finite_weights_are_rejected_at_load() {
        let mut bundle = small_bundle(Stage::Resolution);
        bundle.classifier.weights = array![0.1, f64::NAN, 0.2, 0.3, 0.4];
        let file = NamedTempFile::new().unwrap();
        bundle.save(file.path()).unwrap();
        let err = StageArtifacts::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::NonFiniteParameter("classifier.weights")
        ));
    }
}

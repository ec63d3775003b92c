//! # Two-Stage Outcome Estimation
//!
//! The one place in the crate with real decision logic. A case record is
//! pushed through two independently fitted binary classifiers and their
//! probabilities are composed into a single three-way distribution:
//!
//! ```text
//! record -> [stage A encode+scale] -> p_resolved
//!        -> [stage B encode+scale] -> p_alive_given_resolved
//!        -> law of total probability -> { p_missing, p_alive, p_deceased }
//! ```
//!
//! Stage A answers "will this case be resolved at all?" over all cases;
//! stage B answers "alive or deceased?" over resolved cases only. Their
//! outputs are individually valid but not automatically coherent, which is
//! exactly what the combination step repairs: "resolved" gates the stage-B
//! probability, and a final normalization removes floating-point drift.
//!
//! Each `estimate` call is a pure, single-pass computation over `&self` and
//! the record. Artifacts are injected once at construction and never
//! mutated afterwards, so a shared estimator can serve concurrent callers.

use crate::artifact::{ArtifactError, Stage, StageArtifacts};
use crate::classifier::{Classifier, ClassifierError};
use crate::data::{FeatureRecord, FieldName};
use crate::transform::TransformError;
use ndarray::Array1;
use serde::Serialize;
use thiserror::Error;

/// A normalized three-way outcome distribution for one case record.
///
/// The three probabilities each lie in [0, 1] and sum to 1 within
/// floating-point tolerance. The raw per-stage scores are carried along for
/// display layers and explanatory context; they are inputs to the
/// distribution, not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomeDistribution {
    /// Probability the case remains unresolved.
    pub p_missing: f64,
    /// Probability the person is found alive.
    pub p_alive: f64,
    /// Probability the person is found deceased.
    pub p_deceased: f64,
    /// Stage A's raw score: probability the case is resolved.
    pub p_resolved: f64,
    /// Stage B's raw score: probability of being found alive, conditioned
    /// on the case being resolved.
    pub p_alive_given_resolved: f64,
}

/// Errors surfaced by a single estimation call.
#[derive(Error, Debug)]
pub enum EstimateError {
    /// A record label falls outside a stage's fitted vocabulary. This is a
    /// rejected request, actionable by the caller.
    #[error("{0}")]
    UnknownCategory(#[from] TransformError),
    /// A feature vector disagreed with a classifier's fitted arity. Load
    /// validation makes this unreachable for bundles that went through it.
    #[error("{0}")]
    Classifier(#[from] ClassifierError),
    #[error(
        "The {stage} artifact carries no encoder for field '{field}'. The bundle bypassed \
         load-time validation and cannot be trusted."
    )]
    EncoderMissing { stage: Stage, field: FieldName },
    /// The normalization total was zero or non-finite. The artifacts are
    /// corrupted or incompatible; returning a distribution would silently
    /// present garbage as percentages.
    #[error(
        "Combining the stage scores produced a degenerate distribution (normalization total \
         {total}); the artifacts are corrupted or incompatible."
    )]
    DegenerateDistribution { total: f64 },
}

/// The two-stage conditional probability estimator.
///
/// Constructed once with both stage bundles passed in explicitly; there is
/// no global artifact state. After construction it is shared read-only for
/// the life of the process. `A` and `B` are the fitted classifier types;
/// tests substitute deterministic stubs.
#[derive(Debug)]
pub struct TwoStageEstimator<A = crate::classifier::LogisticModel, B = crate::classifier::LogisticModel>
{
    resolution: StageArtifacts<A>,
    outcome: StageArtifacts<B>,
}

impl<A: Classifier, B: Classifier> TwoStageEstimator<A, B> {
    /// Builds an estimator from the two stage bundles, re-validating each
    /// and checking that they carry the correct, distinct stage tags. The
    /// bundles must arrive in (resolution, outcome) order; a mismatch fails
    /// here, before any inference can run.
    pub fn new(
        resolution: StageArtifacts<A>,
        outcome: StageArtifacts<B>,
    ) -> Result<Self, ArtifactError> {
        resolution.validate()?;
        outcome.validate()?;
        if resolution.stage != Stage::Resolution {
            return Err(ArtifactError::WrongStage {
                expected: Stage::Resolution,
                found: resolution.stage,
            });
        }
        if outcome.stage != Stage::Outcome {
            return Err(ArtifactError::WrongStage {
                expected: Stage::Outcome,
                found: outcome.stage,
            });
        }
        Ok(Self {
            resolution,
            outcome,
        })
    }

    /// Estimates the three-way outcome distribution for one case record.
    ///
    /// Fully succeeds or fails with one of the `EstimateError` conditions;
    /// there are no retries and no partial results.
    pub fn estimate(&self, record: &FeatureRecord) -> Result<OutcomeDistribution, EstimateError> {
        // Stage A: resolved vs. still missing, over all cases.
        let vector_a = bind_features(&self.resolution, record)?;
        let p_resolved = self.resolution.classifier.score(vector_a.view())?;
        let p_missing_raw = 1.0 - p_resolved;

        // Stage B: alive vs. deceased, defined only within the resolved
        // branch. Its artifacts were fitted on the resolved subpopulation
        // and are bound independently of stage A's.
        let vector_b = bind_features(&self.outcome, record)?;
        let p_alive_given_resolved = self.outcome.classifier.score(vector_b.view())?;
        let p_deceased_given_resolved = 1.0 - p_alive_given_resolved;

        // Law of total probability with "resolved" as the gating event.
        let p_alive_raw = p_resolved * p_alive_given_resolved;
        let p_deceased_raw = p_resolved * p_deceased_given_resolved;

        let (p_missing, p_alive, p_deceased) =
            normalize(p_missing_raw, p_alive_raw, p_deceased_raw)?;

        Ok(OutcomeDistribution {
            p_missing,
            p_alive,
            p_deceased,
            p_resolved,
            p_alive_given_resolved,
        })
    }

    /// The resolution-stage bundle this estimator was built with.
    pub fn resolution_artifacts(&self) -> &StageArtifacts<A> {
        &self.resolution
    }

    /// The outcome-stage bundle this estimator was built with.
    pub fn outcome_artifacts(&self) -> &StageArtifacts<B> {
        &self.outcome
    }
}

/// Builds the feature vector for one stage, in the binding order the
/// stage's artifact declares: labels through that stage's own encoders,
/// age through that stage's own scaler.
fn bind_features<C: Classifier>(
    stage: &StageArtifacts<C>,
    record: &FeatureRecord,
) -> Result<Array1<f64>, EstimateError> {
    let mut values = Vec::with_capacity(stage.field_order.len());
    for &field in &stage.field_order {
        match record.label(field) {
            None => values.push(stage.scaler.scale(f64::from(record.approximate_age))),
            Some(label) => {
                let encoder =
                    stage
                        .encoder_for(field)
                        .ok_or(EstimateError::EncoderMissing {
                            stage: stage.stage,
                            field,
                        })?;
                values.push(encoder.encode(label)? as f64);
            }
        }
    }
    Ok(Array1::from_vec(values))
}

/// Rescales the raw three-way masses to sum to exactly one.
///
/// The three raw terms already sum to 1 algebraically (the two stages each
/// contribute a complementary pair), so the division only removes
/// floating-point drift. A zero or non-finite total can therefore only come
/// from artifacts emitting values that are not probabilities; refuse rather
/// than let 0/0 or NaN reach the caller as percentages.
fn normalize(
    p_missing_raw: f64,
    p_alive_raw: f64,
    p_deceased_raw: f64,
) -> Result<(f64, f64, f64), EstimateError> {
    let total = p_missing_raw + p_alive_raw + p_deceased_raw;
    if !total.is_finite() || total <= 0.0 {
        return Err(EstimateError::DegenerateDistribution { total });
    }
    Ok((
        p_missing_raw / total,
        p_alive_raw / total,
        p_deceased_raw / total,
    ))
}

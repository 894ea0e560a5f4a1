//! Trainable-model capability
//!
//! The selection core never sees network internals. A backend implements
//! [`TrainableModel`] (configuration + labelled data → fitted model) and
//! hands back a [`ProbabilityModel`] that produces class-1 probabilities.
//!
//! - [`cross_validation`] - stratified k-fold splitters
//! - [`probe`] - logistic head over pre-extracted embeddings

pub mod cross_validation;
pub mod probe;

pub use cross_validation::{CrossValidator, CVSplit, CVResults};
pub use probe::{LinearProbe, ProbeModel};

use crate::config::{Configuration, ModelKind};
use crate::data::Dataset;
use crate::error::{PipelineError, Result, TrainingFailure};
use ndarray::{Array1, Array2};

/// A fitted, frozen classifier
pub trait ProbabilityModel: Send + Sync {
    /// Probability of class 1 for each row of `x`
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Serialize the fitted state for the deployment registry
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// [`predict_proba`](Self::predict_proba), rejecting output that does not
    /// hold exactly one probability per row
    fn predict_rows(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        if proba.len() != x.nrows() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} probabilities", x.nrows()),
                actual: format!("{} probabilities", proba.len()),
            });
        }
        Ok(proba)
    }
}

/// Backend able to fit a model for a configuration
pub trait TrainableModel: Send + Sync {
    /// Backend name recorded alongside persisted artifacts
    fn name(&self) -> &str;

    /// Whether this backend can fit configurations of `kind`
    fn supports(&self, _kind: ModelKind) -> bool {
        true
    }

    /// Fit a fresh model. Training must start from scratch and depend only
    /// on `config`, `data` and `seed`.
    fn train(
        &self,
        config: &Configuration,
        data: &Dataset,
        seed: u64,
    ) -> std::result::Result<Box<dyn ProbabilityModel>, TrainingFailure>;

    /// Rebuild a model from bytes produced by [`ProbabilityModel::to_bytes`]
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn ProbabilityModel>>;
}

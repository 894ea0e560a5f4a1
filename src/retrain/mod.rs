//! Two-phase retraining of the retained configurations
//!
//! `validate` fits on the training split and scores on the disjoint
//! validation split. `finalize` consumes the validated model and refits from
//! scratch on train ∪ validation with the same configuration and seed. Only
//! final models may enter the ensemble.

use crate::config::{derive_seed, Configuration, DEFAULT_DECISION_THRESHOLD};
use crate::data::Dataset;
use crate::ensemble::RankedCandidate;
use crate::error::{PipelineError, Result};
use crate::scoring::{ScoreReport, ScoringEngine};
use crate::training::{ProbabilityModel, TrainableModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Lifecycle stage of a deployment model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Trained on the training split and scored on validation
    Validated,
    /// Retrained on train ∪ validation; eligible for inference
    Final,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validated => write!(f, "validated"),
            Stage::Final => write!(f, "final"),
        }
    }
}

/// A trained, frozen model bound to one configuration
pub struct DeploymentModel {
    pub configuration: Configuration,
    pub stage: Stage,
    /// Score from the validate phase; carried unchanged into the final stage
    pub validation: ScoreReport,
    /// Seed used for both phases
    pub seed: u64,
    /// Number of samples the model was fitted on
    pub trained_on: usize,
    pub model: Box<dyn ProbabilityModel>,
}

impl fmt::Debug for DeploymentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentModel")
            .field("configuration", &self.configuration.label())
            .field("stage", &self.stage)
            .field("validation", &self.validation)
            .field("seed", &self.seed)
            .field("trained_on", &self.trained_on)
            .finish_non_exhaustive()
    }
}

/// Runs the validate and final phases
pub struct ModelRetrainer {
    backend: Arc<dyn TrainableModel>,
    threshold: f64,
    max_parallel: usize,
    seed: u64,
    scoring: ScoringEngine,
}

impl ModelRetrainer {
    pub fn new(backend: Arc<dyn TrainableModel>) -> Self {
        Self {
            backend,
            threshold: DEFAULT_DECISION_THRESHOLD,
            max_parallel: 1,
            seed: 0,
            scoring: ScoringEngine::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Bound on concurrent retraining jobs; 1 runs them one after another
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train from scratch on `train`, score on `validation`
    pub fn validate(
        &self,
        configuration: &Configuration,
        train: &Dataset,
        validation: &Dataset,
        seed: u64,
    ) -> Result<DeploymentModel> {
        let model = self.backend.train(configuration, train, seed)?;
        let proba = model.predict_rows(validation.features())?;
        let y_true = validation.labels().to_vec();
        let report = self
            .scoring
            .score_probabilities(&y_true, &proba.to_vec(), self.threshold)?;

        info!(config = %configuration.label(), %report, "configuration validated");

        Ok(DeploymentModel {
            configuration: configuration.clone(),
            stage: Stage::Validated,
            validation: report,
            seed,
            trained_on: train.len(),
            model,
        })
    }

    /// Retrain a validated model on `train` ∪ `validation`.
    ///
    /// The result is never scored on the validation split; it keeps the
    /// report from the validate phase.
    pub fn finalize(&self, validated: DeploymentModel, train: &Dataset, validation: &Dataset) -> Result<DeploymentModel> {
        if validated.stage != Stage::Validated {
            return Err(PipelineError::Lifecycle(format!(
                "only validated models can be finalized, {} is {}",
                validated.configuration.label(),
                validated.stage
            )));
        }

        let combined = train.concat(validation)?;
        let model = self.backend.train(&validated.configuration, &combined, validated.seed)?;

        info!(
            config = %validated.configuration.label(),
            samples = combined.len(),
            "configuration finalized"
        );

        Ok(DeploymentModel {
            configuration: validated.configuration,
            stage: Stage::Final,
            validation: validated.validation,
            seed: validated.seed,
            trained_on: combined.len(),
            model,
        })
    }

    fn retrain_one(&self, candidate: &RankedCandidate, train: &Dataset, validation: &Dataset) -> Result<DeploymentModel> {
        let seed = derive_seed(self.seed, candidate.rank as u64);
        let validated = self.validate(&candidate.configuration, train, validation, seed)?;
        self.finalize(validated, train, validation)
    }

    /// Validate and finalize every candidate, preserving rank order.
    ///
    /// Any training failure aborts the whole batch.
    pub fn retrain_all(
        &self,
        candidates: &[RankedCandidate],
        train: &Dataset,
        validation: &Dataset,
    ) -> Result<Vec<DeploymentModel>> {
        let start = Instant::now();
        info!(
            models = candidates.len(),
            max_parallel = self.max_parallel,
            "retraining selected configurations"
        );

        let models = if self.max_parallel == 1 {
            candidates
                .iter()
                .map(|c| self.retrain_one(c, train, validation))
                .collect::<Result<Vec<_>>>()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_parallel)
                .build()
                .map_err(|e| PipelineError::ConfigError(format!("retrain thread pool: {}", e)))?;
            pool.install(|| {
                candidates
                    .par_iter()
                    .map(|c| self.retrain_one(c, train, validation))
                    .collect::<Result<Vec<_>>>()
            })?
        };

        info!(
            models = models.len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "retraining finished"
        );
        Ok(models)
    }
}

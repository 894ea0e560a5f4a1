//! Pipeline configuration

use super::{DEFAULT_DECISION_THRESHOLD, DEFAULT_ENSEMBLE_SIZE, DEFAULT_INNER_FOLDS};
use crate::ensemble::ScoreAggregation;
use crate::error::{PipelineError, Result};
use crate::search::{SamplerType, SearchSpace};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Configuration for the search → select → retrain pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base seed; every fold, trial and retrain derives its own seed from it
    pub seed: u64,

    /// Stratified folds inside each trial
    pub inner_folds: usize,

    /// Outer folds of the nested search
    pub outer_folds: usize,

    /// Configurations proposed per outer fold
    pub trials_per_fold: usize,

    /// Wall-clock budget per outer fold
    pub timeout_secs: Option<f64>,

    /// Stop a fold after this many trials without improvement
    pub early_stopping_patience: Option<usize>,

    /// Minimum improvement that resets the patience counter
    pub min_improvement: f64,

    /// Number of models in the deployed ensemble
    pub ensemble_size: usize,

    /// Per-model probability threshold for class 1 (inclusive)
    pub decision_threshold: f64,

    /// How repeated configurations are scored in the pool
    pub aggregation: ScoreAggregation,

    /// Configuration proposal strategy
    pub sampler: SamplerType,

    /// Random proposals before the TPE sampler starts exploiting history
    pub n_startup_trials: usize,

    /// Run outer folds concurrently
    pub parallel_outer_folds: bool,

    /// Upper bound on concurrent retraining jobs (1 = sequential)
    pub max_parallel_retrains: usize,

    /// Fraction held out as validation split when the caller supplies one dataset
    pub validation_fraction: f64,

    pub search_space: SearchSpace,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            inner_folds: DEFAULT_INNER_FOLDS,
            outer_folds: 3,
            trials_per_fold: 20,
            timeout_secs: None,
            early_stopping_patience: None,
            min_improvement: 1e-6,
            ensemble_size: DEFAULT_ENSEMBLE_SIZE,
            decision_threshold: DEFAULT_DECISION_THRESHOLD,
            aggregation: ScoreAggregation::Best,
            sampler: SamplerType::Tpe,
            n_startup_trials: 8,
            parallel_outer_folds: false,
            max_parallel_retrains: 1,
            validation_fraction: 0.2,
            search_space: SearchSpace::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_outer_folds(mut self, n: usize) -> Self {
        self.outer_folds = n;
        self
    }

    pub fn with_inner_folds(mut self, n: usize) -> Self {
        self.inner_folds = n;
        self
    }

    pub fn with_trials_per_fold(mut self, n: usize) -> Self {
        self.trials_per_fold = n;
        self
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = Some(patience);
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_aggregation(mut self, aggregation: ScoreAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_parallel_outer_folds(mut self, parallel: bool) -> Self {
        self.parallel_outer_folds = parallel;
        self
    }

    pub fn with_max_parallel_retrains(mut self, n: usize) -> Self {
        self.max_parallel_retrains = n;
        self
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = space;
        self
    }

    /// Reject settings that would change the statistical meaning of the run
    pub fn validate(&self) -> Result<()> {
        if self.inner_folds < 2 {
            return Err(PipelineError::ConfigError("inner_folds must be at least 2".to_string()));
        }
        if self.outer_folds < 2 {
            return Err(PipelineError::ConfigError("outer_folds must be at least 2".to_string()));
        }
        if self.trials_per_fold == 0 {
            return Err(PipelineError::ConfigError("trials_per_fold must be positive".to_string()));
        }
        if self.ensemble_size == 0 || self.ensemble_size % 2 == 0 {
            return Err(PipelineError::ConfigError(format!(
                "ensemble_size must be odd so majority votes cannot tie, got {}",
                self.ensemble_size
            )));
        }
        if !(self.decision_threshold > 0.0 && self.decision_threshold <= 1.0) {
            return Err(PipelineError::ConfigError(format!(
                "decision_threshold must lie in (0, 1], got {}",
                self.decision_threshold
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(PipelineError::ConfigError(format!(
                "validation_fraction must lie in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        if self.max_parallel_retrains == 0 {
            return Err(PipelineError::ConfigError(
                "max_parallel_retrains must be at least 1".to_string(),
            ));
        }
        self.search_space.validate()
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

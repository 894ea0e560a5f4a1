//! End-to-end selection pipeline
//!
//! search (nested CV on the training split) → select top K → validate and
//! finalize each → build the ensemble → optionally register it.

use crate::config::{derive_seed, Configuration, PipelineConfig};
use crate::data::Dataset;
use crate::ensemble::{EnsemblePredictor, EnsembleSelector, RankedCandidate};
use crate::error::Result;
use crate::registry::DeploymentRegistry;
use crate::retrain::ModelRetrainer;
use crate::scoring::ScoreReport;
use crate::search::{CancelToken, NestedSearchOptimizer, SearchReport};
use crate::training::TrainableModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Seed streams derived from the pipeline seed
const HOLDOUT_STREAM: u64 = 0x484f;
const RETRAIN_STREAM: u64 = 0x5254;

/// One row of the final report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub label: String,
    pub configuration: Configuration,
    /// Aggregated inner-CV score used for ranking
    pub inner_score: f64,
    /// Score of the validated model on the validation split
    pub validation: ScoreReport,
    pub appearances: usize,
}

/// Everything a run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub search: SearchReport,
    pub selected: Vec<RankedCandidate>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub ensemble: EnsemblePredictor,
    pub duration_secs: f64,
}

impl PipelineOutcome {
    /// Leaderboard entry with the highest validation score (earliest rank on ties)
    pub fn top_model(&self) -> Option<&LeaderboardEntry> {
        self.leaderboard
            .iter()
            .fold(None, |best: Option<&LeaderboardEntry>, e| match best {
                Some(b) if b.validation.score >= e.validation.score => Some(b),
                _ => Some(e),
            })
    }
}

/// Orchestrates search, selection, retraining and registration
pub struct SelectionPipeline {
    backend: Arc<dyn TrainableModel>,
    config: PipelineConfig,
    cancel: CancelToken,
}

impl SelectionPipeline {
    pub fn new(backend: Arc<dyn TrainableModel>, config: PipelineConfig) -> Self {
        Self {
            backend,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Split `data` into train/validation with `validation_fraction`, then run
    pub fn run_with_holdout(&self, data: &Dataset) -> Result<PipelineOutcome> {
        let (train, validation) = data.stratified_holdout(
            self.config.validation_fraction,
            derive_seed(self.config.seed, HOLDOUT_STREAM),
        )?;
        self.run(&train, &validation)
    }

    /// Run on an explicit train/validation split. The search only sees `train`.
    pub fn run(&self, train: &Dataset, validation: &Dataset) -> Result<PipelineOutcome> {
        self.config.validate()?;
        let start = Instant::now();

        info!(
            train = train.len(),
            validation = validation.len(),
            backend = self.backend.name(),
            "pipeline started"
        );

        let search = NestedSearchOptimizer::new(Arc::clone(&self.backend), self.config.clone())
            .with_cancel_token(self.cancel.clone())
            .run(train)?;

        let selected = EnsembleSelector::new(self.config.ensemble_size, self.config.aggregation)
            .select(&search.candidates)?;

        let models = ModelRetrainer::new(Arc::clone(&self.backend))
            .with_threshold(self.config.decision_threshold)
            .with_max_parallel(self.config.max_parallel_retrains)
            .with_seed(derive_seed(self.config.seed, RETRAIN_STREAM))
            .retrain_all(&selected, train, validation)?;

        let leaderboard: Vec<LeaderboardEntry> = selected
            .iter()
            .zip(models.iter())
            .map(|(candidate, model)| LeaderboardEntry {
                rank: candidate.rank,
                label: candidate.configuration.label(),
                configuration: candidate.configuration.clone(),
                inner_score: candidate.score,
                validation: model.validation,
                appearances: candidate.appearances,
            })
            .collect();

        let ensemble = EnsemblePredictor::new(models, self.config.ensemble_size, self.config.decision_threshold)?;
        let duration_secs = start.elapsed().as_secs_f64();

        info!(
            trials = search.trials_run,
            members = ensemble.len(),
            nested_estimate = search.nested_estimate(),
            duration_secs,
            "pipeline finished"
        );

        Ok(PipelineOutcome {
            search,
            selected,
            leaderboard,
            ensemble,
            duration_secs,
        })
    }

    /// Persist the outcome's ensemble, replacing whatever the registry held
    pub fn register(&self, outcome: &PipelineOutcome, registry: &mut DeploymentRegistry) -> Result<Vec<String>> {
        registry.register_ensemble(
            outcome.ensemble.members(),
            self.config.decision_threshold,
            self.backend.name(),
        )
    }
}

//! Nested cross-validated search
//!
//! Outer stratified folds each run their own sequential search over the
//! configuration space. Every evaluated configuration lands in one shared,
//! append-only [`CandidatePool`]; ranking happens later in the ensemble
//! selector.

use super::sampler::create_sampler;
use super::trial::{Trial, TrialRunner};
use crate::config::{derive_seed, Configuration, PipelineConfig};
use crate::data::Dataset;
use crate::error::{PipelineError, Result};
use crate::scoring::{ScoreReport, ScoringEngine};
use crate::training::{CVSplit, CrossValidator, TrainableModel};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Seed sub-streams within one outer fold
const SAMPLER_STREAM: u64 = 0;
const INNER_SPLIT_STREAM: u64 = 1;
const HELD_OUT_STREAM: u64 = 2;

/// One evaluated configuration in the shared pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub configuration: Configuration,
    /// Mean inner-fold score
    pub score: f64,
    pub fold_scores: Vec<f64>,
    pub outer_fold: usize,
    pub trial_idx: usize,
}

impl Candidate {
    /// Position in the deterministic discovery order
    pub fn discovery_key(&self) -> (usize, usize) {
        (self.outer_fold, self.trial_idx)
    }
}

/// Append-only pool shared by all outer folds
#[derive(Debug, Default)]
pub struct CandidatePool {
    entries: Mutex<Vec<Candidate>>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, candidate: Candidate) {
        self.entries.lock().push(candidate);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the pool in discovery order, independent of insertion timing
    pub fn snapshot(&self) -> Vec<Candidate> {
        let mut entries = self.entries.lock().clone();
        entries.sort_by_key(Candidate::discovery_key);
        entries
    }
}

/// Cooperative cancellation flag. Checked before each trial is dispatched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why an outer fold stopped proposing configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Budget,
    Timeout,
    EarlyStopped,
    Cancelled,
}

/// Summary of one outer fold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OuterFoldReport {
    pub fold: usize,
    /// Best configuration found on this fold's outer-train partition
    pub best: Option<Configuration>,
    pub inner_score: f64,
    /// Best configuration retrained on outer-train, scored on outer-held-out
    pub held_out: Option<ScoreReport>,
    pub trials_run: usize,
    pub stop_reason: StopReason,
}

/// Output of a full nested search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    /// Every evaluated configuration, in discovery order
    pub candidates: Vec<Candidate>,
    /// Per outer fold, in fold order
    pub outer_folds: Vec<OuterFoldReport>,
    pub trials_run: usize,
    pub cancelled: bool,
}

impl SearchReport {
    /// Mean outer-held-out score over the folds that produced one
    pub fn nested_estimate(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .outer_folds
            .iter()
            .filter_map(|r| r.held_out.as_ref().map(|h| h.score))
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

/// Drives the outer folds and the per-fold configuration search
pub struct NestedSearchOptimizer {
    backend: Arc<dyn TrainableModel>,
    config: PipelineConfig,
    cancel: CancelToken,
}

impl NestedSearchOptimizer {
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

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Every model kind in the search space must be trainable by the backend
    fn check_backend_supports_space(&self) -> Result<()> {
        let unsupported: Vec<&str> = self
            .config
            .search_space
            .model_kinds
            .iter()
            .filter(|kind| !self.backend.supports(**kind))
            .map(|kind| kind.as_str())
            .collect();
        if unsupported.is_empty() {
            return Ok(());
        }
        Err(PipelineError::ConfigError(format!(
            "backend {} cannot train model kinds: {}",
            self.backend.name(),
            unsupported.join(", ")
        )))
    }

    /// Run the nested search over `data`
    pub fn run(&self, data: &Dataset) -> Result<SearchReport> {
        self.config.validate()?;
        self.check_backend_supports_space()?;

        let labels = data.labels().to_vec();
        let splits = CrossValidator::stratified(self.config.outer_folds, derive_seed(self.config.seed, 0))
            .split(&labels)?;

        info!(
            samples = data.len(),
            outer_folds = self.config.outer_folds,
            inner_folds = self.config.inner_folds,
            trials_per_fold = self.config.trials_per_fold,
            "starting nested search"
        );

        let pool = CandidatePool::new();
        let mut outer_folds: Vec<OuterFoldReport> = if self.config.parallel_outer_folds {
            splits
                .par_iter()
                .map(|split| self.run_outer_fold(split, data, &pool))
                .collect::<Result<Vec<_>>>()?
        } else {
            splits
                .iter()
                .map(|split| self.run_outer_fold(split, data, &pool))
                .collect::<Result<Vec<_>>>()?
        };
        outer_folds.sort_by_key(|r| r.fold);

        let report = SearchReport {
            candidates: pool.snapshot(),
            trials_run: outer_folds.iter().map(|r| r.trials_run).sum(),
            outer_folds,
            cancelled: self.cancel.is_cancelled(),
        };

        info!(
            trials = report.trials_run,
            candidates = report.candidates.len(),
            cancelled = report.cancelled,
            "nested search finished"
        );
        Ok(report)
    }

    fn run_outer_fold(&self, split: &CVSplit, data: &Dataset, pool: &CandidatePool) -> Result<OuterFoldReport> {
        let fold = split.fold_idx;
        let fold_seed = derive_seed(self.config.seed, fold as u64 + 1);
        let outer_train = data.select(&split.train_indices);

        let runner = TrialRunner::new(Arc::clone(&self.backend))
            .with_folds(self.config.inner_folds)
            .with_threshold(self.config.decision_threshold);
        let mut sampler = create_sampler(
            self.config.sampler,
            self.config.search_space.clone(),
            derive_seed(fold_seed, SAMPLER_STREAM),
            self.config.n_startup_trials,
        );
        let inner_seed = derive_seed(fold_seed, INNER_SPLIT_STREAM);

        let start = Instant::now();
        let mut history: Vec<(Configuration, f64)> = Vec::new();
        let mut best: Option<(Configuration, f64)> = None;
        let mut trials_without_improvement = 0;
        let mut stop_reason = StopReason::Budget;

        for trial_idx in 0..self.config.trials_per_fold {
            if self.cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }
            if let Some(t) = self.config.timeout_secs {
                if start.elapsed().as_secs_f64() > t {
                    info!(fold, trials = trial_idx, "outer fold timed out");
                    stop_reason = StopReason::Timeout;
                    break;
                }
            }
            if let Some(p) = self.config.early_stopping_patience {
                if trials_without_improvement >= p {
                    info!(fold, trials = trial_idx, patience = p, "outer fold stopped early");
                    stop_reason = StopReason::EarlyStopped;
                    break;
                }
            }

            let trial = Trial {
                configuration: sampler.propose(&history),
                outer_fold: fold,
                trial_idx,
            };
            let outcome = runner.run(&trial.configuration, &outer_train, inner_seed)?;
            let score = outcome.mean_score();

            let is_improvement = match &best {
                None => true,
                Some((_, b)) => score > b + self.config.min_improvement,
            };
            if is_improvement {
                trials_without_improvement = 0;
            } else {
                trials_without_improvement += 1;
            }
            // Strictly greater keeps the earliest configuration on ties
            if best.as_ref().map_or(true, |(_, b)| score > *b) {
                best = Some((trial.configuration.clone(), score));
            }

            debug!(
                fold,
                trial = trial_idx,
                config = %trial.configuration.label(),
                score,
                "trial recorded"
            );

            history.push((trial.configuration.clone(), score));
            pool.record(Candidate {
                configuration: trial.configuration,
                score,
                fold_scores: outcome.cv.scores,
                outer_fold: fold,
                trial_idx,
            });
        }

        let trials_run = history.len();
        let held_out = match &best {
            Some((config, _)) if !self.cancel.is_cancelled() => {
                let held_out = data.select(&split.test_indices);
                self.score_held_out(config, &outer_train, &held_out, derive_seed(fold_seed, HELD_OUT_STREAM))?
            }
            _ => None,
        };

        let inner_score = best.as_ref().map_or(0.0, |(_, s)| *s);
        info!(
            fold,
            trials = trials_run,
            inner_score,
            held_out = held_out.as_ref().map(|r| r.score),
            stop = ?stop_reason,
            "outer fold finished"
        );

        Ok(OuterFoldReport {
            fold,
            best: best.map(|(c, _)| c),
            inner_score,
            held_out,
            trials_run,
            stop_reason,
        })
    }

    /// Retrain on outer-train and score on outer-held-out. Failures only cost
    /// the estimate, not the search.
    fn score_held_out(
        &self,
        config: &Configuration,
        train: &Dataset,
        held_out: &Dataset,
        seed: u64,
    ) -> Result<Option<ScoreReport>> {
        let model = match self.backend.train(config, train, seed) {
            Ok(model) => model,
            Err(failure) => {
                warn!(config = %config.label(), error = %failure, "outer-fold retrain failed");
                return Ok(None);
            }
        };
        let proba = match model.predict_rows(held_out.features()) {
            Ok(p) => p,
            Err(e) => {
                warn!(config = %config.label(), error = %e, "outer-fold prediction failed");
                return Ok(None);
            }
        };
        let y_true = held_out.labels().to_vec();
        let report = ScoringEngine::new().score_probabilities(&y_true, &proba.to_vec(), self.config.decision_threshold)?;
        Ok(Some(report))
    }
}

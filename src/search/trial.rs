//! Trial runner: inner stratified k-fold evaluation of one configuration

use crate::config::{derive_seed, Configuration, DEFAULT_DECISION_THRESHOLD, DEFAULT_INNER_FOLDS};
use crate::data::Dataset;
use crate::error::Result;
use crate::scoring::{ScoreReport, ScoringEngine};
use crate::training::{CVResults, CVSplit, CrossValidator, TrainableModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One (configuration, outer fold) pairing dispatched by the optimizer
#[derive(Debug, Clone)]
pub struct Trial {
    pub configuration: Configuration,
    pub outer_fold: usize,
    pub trial_idx: usize,
}

/// Result of evaluating one configuration across the inner folds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOutcome {
    /// Per-fold reports, in fold order
    pub fold_reports: Vec<ScoreReport>,
    /// Aggregated fold scores
    pub cv: CVResults,
    /// Folds whose training or prediction failed and were scored 0
    pub failed_folds: usize,
    pub duration_secs: f64,
}

impl TrialOutcome {
    pub fn mean_score(&self) -> f64 {
        self.cv.mean_score
    }

    pub fn fold_scores(&self) -> &[f64] {
        &self.cv.scores
    }
}

/// Evaluates configurations with inner stratified k-fold cross-validation
pub struct TrialRunner {
    backend: Arc<dyn TrainableModel>,
    n_folds: usize,
    threshold: f64,
    scoring: ScoringEngine,
}

impl TrialRunner {
    pub fn new(backend: Arc<dyn TrainableModel>) -> Self {
        Self {
            backend,
            n_folds: DEFAULT_INNER_FOLDS,
            threshold: DEFAULT_DECISION_THRESHOLD,
            scoring: ScoringEngine::new(),
        }
    }

    pub fn with_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Score `config` on `data`.
    ///
    /// The same `seed` yields the same fold assignment, so every configuration
    /// evaluated within one outer fold sees identical inner splits. Training
    /// failures are absorbed: the fold scores 0 and the trial continues.
    pub fn run(&self, config: &Configuration, data: &Dataset, seed: u64) -> Result<TrialOutcome> {
        let start = Instant::now();
        let labels = data.labels().to_vec();
        let splits = CrossValidator::stratified(self.n_folds, derive_seed(seed, 0))
            .split(&labels)?;

        let results: Vec<(ScoreReport, bool)> = splits
            .par_iter()
            .map(|split| self.run_fold(config, data, split, derive_seed(seed, split.fold_idx as u64 + 1)))
            .collect::<Result<Vec<_>>>()?;

        let failed_folds = results.iter().filter(|(_, failed)| *failed).count();
        let fold_reports: Vec<ScoreReport> = results.into_iter().map(|(r, _)| r).collect();
        let cv = CVResults::from_scores(fold_reports.iter().map(|r| r.score).collect());

        debug!(
            config = %config.label(),
            mean = cv.mean_score,
            std = cv.std_score,
            failed_folds,
            "trial evaluated"
        );

        Ok(TrialOutcome {
            fold_reports,
            cv,
            failed_folds,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Train on the fold's training part, score its held-out part.
    /// Returns the report and whether the fold failed.
    fn run_fold(
        &self,
        config: &Configuration,
        data: &Dataset,
        split: &CVSplit,
        seed: u64,
    ) -> Result<(ScoreReport, bool)> {
        let train = data.select(&split.train_indices);
        let held_out = data.select(&split.test_indices);
        let (n0, n1) = held_out.class_counts();

        let model = match self.backend.train(config, &train, seed) {
            Ok(model) => model,
            Err(failure) => {
                warn!(
                    config = %config.label(),
                    fold = split.fold_idx,
                    error = %failure,
                    "fold training failed, scoring 0"
                );
                return Ok((ScoreReport::failed(n0, n1), true));
            }
        };

        let proba = match model.predict_rows(held_out.features()) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    config = %config.label(),
                    fold = split.fold_idx,
                    error = %e,
                    "fold prediction failed, scoring 0"
                );
                return Ok((ScoreReport::failed(n0, n1), true));
            }
        };

        let y_true = held_out.labels().to_vec();
        let report = self
            .scoring
            .score_probabilities(&y_true, &proba.to_vec(), self.threshold)?;
        Ok((report, false))
    }
}

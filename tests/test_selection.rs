//! Integration tests for the nested search and top-K selection

use cell_ensemble::config::{Configuration, ModelKind, PipelineConfig};
use cell_ensemble::data::Dataset;
use cell_ensemble::ensemble::{EnsembleSelector, ScoreAggregation};
use cell_ensemble::error::{PipelineError, Result, TrainingFailure};
use cell_ensemble::search::{
    CancelToken, Candidate, NestedSearchOptimizer, SamplerType, SearchSpace, StopReason, TrialRunner,
};
use cell_ensemble::training::{ProbabilityModel, TrainableModel};
use ndarray::{Array1, Array2};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Probability = feature 0 scaled by the configured learning rate, clipped to 1
struct Scaled(f64);

impl ProbabilityModel for Scaled {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.column(0).mapv(|v| (v * self.0).min(1.0)))
    }
    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_le_bytes().to_vec())
    }
}

/// Quality grows with learning rate; batch size 32 always diverges
struct LrBackend {
    calls: AtomicUsize,
}

impl LrBackend {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

impl TrainableModel for LrBackend {
    fn name(&self) -> &str {
        "lr"
    }
    fn train(
        &self,
        config: &Configuration,
        _data: &Dataset,
        _seed: u64,
    ) -> std::result::Result<Box<dyn ProbabilityModel>, TrainingFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if config.hyperparameters.batch_size == 32 {
            return Err(TrainingFailure::Diverged { epoch: 3 });
        }
        Ok(Box::new(Scaled(config.hyperparameters.learning_rate * 3.0)))
    }
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn ProbabilityModel>> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| PipelineError::SerializationError("expected 8 bytes".to_string()))?;
        Ok(Box::new(Scaled(f64::from_le_bytes(raw))))
    }
}

/// Predicts one row fewer than it is given
struct Truncated;

impl ProbabilityModel for Truncated {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(x.nrows().saturating_sub(1), 1.0))
    }
    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

struct TruncatingBackend;

impl TrainableModel for TruncatingBackend {
    fn name(&self) -> &str {
        "truncating"
    }
    fn train(
        &self,
        _config: &Configuration,
        _data: &Dataset,
        _seed: u64,
    ) -> std::result::Result<Box<dyn ProbabilityModel>, TrainingFailure> {
        Ok(Box::new(Truncated))
    }
    fn load(&self, _bytes: &[u8]) -> Result<Box<dyn ProbabilityModel>> {
        Ok(Box::new(Truncated))
    }
}

fn dataset(n: usize) -> Dataset {
    // One third class 1; feature 0 is the label
    let labels = Array1::from_shape_fn(n, |i| u8::from(i % 3 == 0));
    let features = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { f64::from(labels[i]) } else { i as f64 });
    Dataset::from_arrays(features, labels).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig::new()
        .with_seed(11)
        .with_outer_folds(3)
        .with_inner_folds(5)
        .with_trials_per_fold(8)
        .with_sampler(SamplerType::Random)
        .with_search_space(SearchSpace::linear_probe())
}

// ============================================================================
// Trial runner
// ============================================================================

#[test]
fn test_trial_runner_absorbs_divergence() {
    let runner = TrialRunner::new(Arc::new(LrBackend::new()));
    let config = Configuration::new(ModelKind::LinearProbe).with_batch_size(32).with_learning_rate(0.3);
    let outcome = runner.run(&config, &dataset(60), 5).unwrap();

    assert_eq!(outcome.fold_reports.len(), 5);
    assert_eq!(outcome.failed_folds, 5);
    assert_eq!(outcome.mean_score(), 0.0);
}

#[test]
fn test_trial_runner_scores_misshapen_output_zero() {
    let runner = TrialRunner::new(Arc::new(TruncatingBackend));
    let config = Configuration::new(ModelKind::LinearProbe).with_batch_size(16).with_learning_rate(0.3);
    let outcome = runner.run(&config, &dataset(60), 5).unwrap();

    assert_eq!(outcome.failed_folds, 5);
    assert_eq!(outcome.mean_score(), 0.0);
}

#[test]
fn test_trial_runner_is_reproducible() {
    let runner = TrialRunner::new(Arc::new(LrBackend::new()));
    let config = Configuration::new(ModelKind::LinearProbe).with_batch_size(16).with_learning_rate(0.3);
    let a = runner.run(&config, &dataset(60), 5).unwrap();
    let b = runner.run(&config, &dataset(60), 5).unwrap();
    assert_eq!(a.fold_scores(), b.fold_scores());
    assert_eq!(a.mean_score(), 1.0);
}

#[test]
fn test_inner_folds_are_stratified() {
    // 60 samples, 20 positives: every fold holds 4 positives and 8 negatives
    let runner = TrialRunner::new(Arc::new(LrBackend::new()));
    let config = Configuration::new(ModelKind::LinearProbe).with_batch_size(16).with_learning_rate(0.3);
    let outcome = runner.run(&config, &dataset(60), 9).unwrap();
    for report in &outcome.fold_reports {
        assert_eq!((report.n0, report.n1), (8, 4));
    }
}

// ============================================================================
// Nested search
// ============================================================================

#[test]
fn test_search_is_deterministic() {
    let data = dataset(90);
    let a = NestedSearchOptimizer::new(Arc::new(LrBackend::new()), config()).run(&data).unwrap();
    let b = NestedSearchOptimizer::new(Arc::new(LrBackend::new()), config().with_parallel_outer_folds(true))
        .run(&data)
        .unwrap();

    assert_eq!(a.candidates.len(), 24);
    let pairs = |r: &[Candidate]| -> Vec<(Configuration, u64)> {
        r.iter().map(|c| (c.configuration.clone(), c.score.to_bits())).collect()
    };
    assert_eq!(pairs(&a.candidates), pairs(&b.candidates));
}

#[test]
fn test_failed_configurations_stay_in_pool_with_zero() {
    let report = NestedSearchOptimizer::new(Arc::new(LrBackend::new()), config())
        .run(&dataset(90))
        .unwrap();
    for c in &report.candidates {
        if c.configuration.hyperparameters.batch_size == 32 {
            assert_eq!(c.score, 0.0);
        }
    }
}

#[test]
fn test_cancellation_keeps_recorded_results() {
    let token = CancelToken::new();
    let optimizer = NestedSearchOptimizer::new(Arc::new(LrBackend::new()), config()).with_cancel_token(token.clone());
    let before = optimizer.run(&dataset(90)).unwrap();
    assert!(!before.cancelled);

    token.cancel();
    let after = optimizer.run(&dataset(90)).unwrap();
    assert!(after.cancelled);
    assert!(after.candidates.is_empty());
    assert!(after.outer_folds.iter().all(|f| f.stop_reason == StopReason::Cancelled));
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_selection_returns_k_distinct() {
    let report = NestedSearchOptimizer::new(Arc::new(LrBackend::new()), config())
        .run(&dataset(90))
        .unwrap();

    for aggregation in [ScoreAggregation::Best, ScoreAggregation::MeanOfMeans] {
        let selected = EnsembleSelector::new(5, aggregation).select(&report.candidates).unwrap();
        assert_eq!(selected.len(), 5);
        let distinct: HashSet<&Configuration> = selected.iter().map(|r| &r.configuration).collect();
        assert_eq!(distinct.len(), 5);
        for pair in selected.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].discovery_key < pair[1].discovery_key);
            }
        }
    }
}

#[test]
fn test_tiny_space_is_degenerate() {
    // Only two distinct configurations exist
    let mut space = SearchSpace::linear_probe().with_learning_rates(vec![0.3]);
    space.loss_sets.truncate(1);
    space.batch_sizes = vec![16];
    space.epochs = vec![20];
    space.color_jitter = vec![false];
    space.scheduler = vec![false, true];

    let report = NestedSearchOptimizer::new(Arc::new(LrBackend::new()), config().with_search_space(space))
        .run(&dataset(90))
        .unwrap();
    assert_eq!(report.candidates.len(), 24);

    match EnsembleSelector::default().select(&report.candidates) {
        Err(PipelineError::DegenerateSearch { required, found }) => {
            assert_eq!(required, 5);
            assert_eq!(found, 2);
        }
        other => panic!("expected DegenerateSearch, got {:?}", other.map(|v| v.len())),
    }
}

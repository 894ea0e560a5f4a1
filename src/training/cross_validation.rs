//! Cross-validation splitters

use crate::error::{PipelineError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter over binary labels. Always seeded, so the same
/// labels and seed give the same folds.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    n_splits: usize,
    shuffle: bool,
    random_state: u64,
}

impl CrossValidator {
    /// Stratified k-fold, shuffled within each class by `seed`
    pub fn stratified(n_splits: usize, seed: u64) -> Self {
        Self {
            n_splits,
            shuffle: true,
            random_state: seed,
        }
    }

    /// Keep samples in index order within each class
    pub fn without_shuffle(mut self) -> Self {
        self.shuffle = false;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate train/test splits preserving the class ratio of `y` in every fold
    pub fn split(&self, y: &[u8]) -> Result<Vec<CVSplit>> {
        if self.n_splits < 2 {
            return Err(PipelineError::InvalidInput(
                "n_splits must be at least 2".to_string()
            ));
        }
        if y.len() < self.n_splits {
            return Err(PipelineError::InvalidInput(
                format!("n_samples ({}) must be >= n_splits ({})", y.len(), self.n_splits)
            ));
        }
        Ok(self.stratified_k_fold_split(y, self.n_splits, self.shuffle))
    }

    fn stratified_k_fold_split(&self, y: &[u8], n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        // Ordered by class so fold contents do not depend on hash order
        let mut class_indices: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
        for (idx, &class) in y.iter().enumerate() {
            class_indices.entry(class).or_default().push(idx);
        }

        for (class, members) in &class_indices {
            if members.len() < n_splits {
                warn!(
                    class,
                    members = members.len(),
                    n_splits,
                    "class smaller than fold count, some folds will lack it"
                );
            }
        }

        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal each class round-robin, continuing where the previous class
        // stopped so fold sizes differ by at most one
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut slot = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[slot % n_splits].push(idx);
                slot += 1;
            }
        }

        let mut splits = Vec::with_capacity(n_splits);
        for fold_idx in 0..n_splits {
            let mut test_indices = folds[fold_idx].clone();
            test_indices.sort_unstable();
            let mut train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train_indices.sort_unstable();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
        }

        splits
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold, in fold order
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores.
    ///
    /// Sums are taken over the sorted scores so the mean is bit-identical
    /// for any fold ordering.
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self { scores, mean_score: 0.0, std_score: 0.0, n_folds };
        }

        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);

        let mean_score = sorted.iter().sum::<f64>() / n_folds as f64;
        let variance = sorted.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}

//! Top-K selection over the candidate pool

use crate::config::{Configuration, DEFAULT_ENSEMBLE_SIZE};
use crate::error::{PipelineError, Result};
use crate::search::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// How repeated evaluations of one configuration are folded into one score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAggregation {
    /// Highest mean inner score across appearances
    Best,
    /// Mean of the per-appearance mean inner scores
    MeanOfMeans,
}

impl Default for ScoreAggregation {
    fn default() -> Self {
        ScoreAggregation::Best
    }
}

/// A retained configuration with its position in the ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub configuration: Configuration,
    pub score: f64,
    /// 1-based rank
    pub rank: usize,
    /// Earliest (outer fold, trial index) at which the configuration appeared
    pub discovery_key: (usize, usize),
    /// Number of times it was evaluated
    pub appearances: usize,
}

struct Group<'a> {
    configuration: &'a Configuration,
    first_key: (usize, usize),
    scores: Vec<f64>,
}

impl Group<'_> {
    fn aggregate(&self, rule: ScoreAggregation) -> f64 {
        match rule {
            ScoreAggregation::Best => self.scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ScoreAggregation::MeanOfMeans => {
                let mut sorted = self.scores.clone();
                sorted.sort_by(f64::total_cmp);
                sorted.iter().sum::<f64>() / sorted.len() as f64
            }
        }
    }
}

/// Ranks distinct configurations and keeps exactly K of them
#[derive(Debug, Clone, Copy)]
pub struct EnsembleSelector {
    k: usize,
    aggregation: ScoreAggregation,
}

impl Default for EnsembleSelector {
    fn default() -> Self {
        Self::new(DEFAULT_ENSEMBLE_SIZE, ScoreAggregation::Best)
    }
}

impl EnsembleSelector {
    pub fn new(k: usize, aggregation: ScoreAggregation) -> Self {
        Self { k, aggregation }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Every distinct configuration, best first. Ties go to the configuration
    /// discovered earliest.
    pub fn rank(&self, candidates: &[Candidate]) -> Vec<RankedCandidate> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| c.discovery_key());

        let mut index: HashMap<&Configuration, usize> = HashMap::new();
        let mut groups: Vec<Group<'_>> = Vec::new();
        for c in ordered {
            match index.get(&c.configuration) {
                Some(&i) => groups[i].scores.push(c.score),
                None => {
                    index.insert(&c.configuration, groups.len());
                    groups.push(Group {
                        configuration: &c.configuration,
                        first_key: c.discovery_key(),
                        scores: vec![c.score],
                    });
                }
            }
        }

        let mut scored: Vec<(f64, &Group<'_>)> =
            groups.iter().map(|g| (g.aggregate(self.aggregation), g)).collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.first_key.cmp(&b.1.first_key)));

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, g))| RankedCandidate {
                configuration: g.configuration.clone(),
                score,
                rank: i + 1,
                discovery_key: g.first_key,
                appearances: g.scores.len(),
            })
            .collect()
    }

    /// Exactly K distinct configurations, or `DegenerateSearch`
    pub fn select(&self, candidates: &[Candidate]) -> Result<Vec<RankedCandidate>> {
        if self.k == 0 {
            return Err(PipelineError::InvalidInput("ensemble size must be positive".to_string()));
        }

        let mut ranked = self.rank(candidates);
        if ranked.len() < self.k {
            return Err(PipelineError::DegenerateSearch {
                required: self.k,
                found: ranked.len(),
            });
        }
        ranked.truncate(self.k);

        info!(
            k = self.k,
            pool = candidates.len(),
            aggregation = ?self.aggregation,
            best = ranked[0].score,
            cutoff = ranked[self.k - 1].score,
            "ensemble members selected"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;

    fn config(lr: f64) -> Configuration {
        Configuration::new(ModelKind::LinearProbe).with_learning_rate(lr)
    }

    fn candidate(lr: f64, score: f64, outer_fold: usize, trial_idx: usize) -> Candidate {
        Candidate {
            configuration: config(lr),
            score,
            fold_scores: vec![score],
            outer_fold,
            trial_idx,
        }
    }

    #[test]
    fn test_selects_top_k_distinct() {
        let pool = vec![
            candidate(0.1, 0.5, 0, 0),
            candidate(0.2, 0.9, 0, 1),
            candidate(0.3, 0.7, 0, 2),
            candidate(0.2, 0.4, 1, 0),
            candidate(0.4, 0.6, 1, 1),
            candidate(0.5, 0.8, 1, 2),
            candidate(0.6, 0.1, 1, 3),
        ];
        let selected = EnsembleSelector::default().select(&pool).unwrap();
        let lrs: Vec<f64> = selected.iter().map(|r| r.configuration.hyperparameters.learning_rate).collect();
        assert_eq!(lrs, vec![0.2, 0.5, 0.3, 0.4, 0.1]);
        assert_eq!(selected.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(selected[0].appearances, 2);
    }

    #[test]
    fn test_ties_broken_by_discovery() {
        let pool = vec![
            candidate(0.5, 0.6, 1, 0),
            candidate(0.4, 0.6, 0, 3),
            candidate(0.3, 0.6, 0, 1),
            candidate(0.2, 0.6, 2, 0),
            candidate(0.1, 0.6, 0, 2),
        ];
        let selected = EnsembleSelector::default().select(&pool).unwrap();
        let keys: Vec<_> = selected.iter().map(|r| r.discovery_key).collect();
        assert_eq!(keys, vec![(0, 1), (0, 2), (0, 3), (1, 0), (2, 0)]);
    }

    #[test]
    fn test_degenerate_search() {
        // Seven evaluations but only four distinct configurations
        let pool = vec![
            candidate(0.1, 0.5, 0, 0),
            candidate(0.2, 0.5, 0, 1),
            candidate(0.1, 0.6, 1, 0),
            candidate(0.3, 0.5, 1, 1),
            candidate(0.4, 0.5, 2, 0),
            candidate(0.4, 0.7, 2, 1),
            candidate(0.2, 0.2, 2, 2),
        ];
        match EnsembleSelector::default().select(&pool) {
            Err(PipelineError::DegenerateSearch { required, found }) => {
                assert_eq!(required, 5);
                assert_eq!(found, 4);
            }
            other => panic!("expected DegenerateSearch, got {:?}", other),
        }
    }

    #[test]
    fn test_aggregation_rules_differ() {
        let mut pool = vec![candidate(0.1, 0.9, 0, 0), candidate(0.1, 0.1, 1, 0), candidate(0.2, 0.6, 0, 1)];
        pool.extend((0..3).map(|i| candidate(0.3 + i as f64 * 0.1, 0.05, 2, i)));

        let best = EnsembleSelector::new(5, ScoreAggregation::Best).select(&pool).unwrap();
        assert_eq!(best[0].configuration, config(0.1));
        assert_eq!(best[0].score, 0.9);

        let mean = EnsembleSelector::new(5, ScoreAggregation::MeanOfMeans).select(&pool).unwrap();
        assert_eq!(mean[0].configuration, config(0.2));
        assert!((mean[1].score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let pool: Vec<Candidate> = (0..8).map(|i| candidate(0.01 * (i + 1) as f64, (i % 3) as f64 / 3.0, i % 2, i)).collect();
        let mut reversed = pool.clone();
        reversed.reverse();

        let a = EnsembleSelector::default().select(&pool).unwrap();
        let b = EnsembleSelector::default().select(&reversed).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.configuration, y.configuration);
            assert_eq!(x.rank, y.rank);
        }
    }
}

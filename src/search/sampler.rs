//! Configuration proposal strategies
//!
//! The optimizer only depends on [`ConfigSampler::propose`]; any sequential
//! or random strategy satisfying that contract can be plugged in.

use super::space::{SearchSpace, N_DIMENSIONS};
use crate::config::Configuration;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Type of sampler to use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerType {
    /// Uniform random proposals
    Random,
    /// Tree-structured Parzen Estimator (simplified, categorical)
    Tpe,
}

/// Black-box proposal strategy
pub trait ConfigSampler: Send {
    /// Propose the next configuration given the (configuration, score)
    /// history of the current outer fold. Higher scores are better.
    fn propose(&mut self, history: &[(Configuration, f64)]) -> Configuration;
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    space: SearchSpace,
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl ConfigSampler for RandomSampler {
    fn propose(&mut self, _history: &[(Configuration, f64)]) -> Configuration {
        self.space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler over categorical dimensions.
///
/// After the startup phase, history is split into the best `gamma` fraction
/// and the rest; of `n_candidates` random draws, the one that agrees most
/// with the good trials and least with the bad ones wins. Already-evaluated
/// configurations are only re-proposed when nothing new was drawn.
#[derive(Debug)]
pub struct TpeSampler {
    space: SearchSpace,
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TpeSampler {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set gamma (quantile for splitting good/bad)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Mean fraction of dimensions on which `candidate` matches each group member
    fn similarity(candidate: &[usize; N_DIMENSIONS], group: &[[Option<usize>; N_DIMENSIONS]]) -> f64 {
        if group.is_empty() {
            return 0.0;
        }
        let total: usize = group
            .iter()
            .map(|coords| {
                candidate
                    .iter()
                    .zip(coords.iter())
                    .filter(|(c, g)| Some(**c) == **g)
                    .count()
            })
            .sum();
        total as f64 / (group.len() * N_DIMENSIONS) as f64
    }
}

impl ConfigSampler for TpeSampler {
    fn propose(&mut self, history: &[(Configuration, f64)]) -> Configuration {
        if history.len() < self.n_startup_trials {
            return self.space.sample(&mut self.rng);
        }

        // Stable sort keeps earlier trials first among equal scores
        let mut sorted: Vec<&(Configuration, f64)> = history.iter().collect();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));

        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).clamp(1, sorted.len());
        let encode = |entries: &[&(Configuration, f64)]| -> Vec<[Option<usize>; N_DIMENSIONS]> {
            entries.iter().map(|(c, _)| self.space.coordinates_of(c)).collect()
        };
        let good = encode(&sorted[..n_good]);
        let bad = encode(&sorted[n_good..]);
        let seen: HashSet<&Configuration> = history.iter().map(|(c, _)| c).collect();

        let mut best: Option<(Configuration, f64)> = None;
        for _ in 0..self.n_candidates {
            let coords = self.space.sample_coordinates(&mut self.rng);
            let candidate = self.space.configuration_at(&coords);

            let mut score = Self::similarity(&coords, &good) - Self::similarity(&coords, &bad);
            if seen.contains(&candidate) {
                score -= 2.0;
            }

            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((config, _)) => config,
            None => self.space.sample(&mut self.rng),
        }
    }
}

/// Create a sampler from type
pub fn create_sampler(
    sampler_type: SamplerType,
    space: SearchSpace,
    seed: u64,
    n_startup_trials: usize,
) -> Box<dyn ConfigSampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(space, seed)),
        SamplerType::Tpe => Box::new(TpeSampler::new(space, seed).with_n_startup(n_startup_trials)),
    }
}

//! Search space over classifier configurations
//!
//! Every dimension is a finite list of choices. Keeping the space discrete
//! means the same configuration can be proposed in several outer folds,
//! which is what makes candidate-pool deduplication meaningful.

use crate::config::{Augmentation, Configuration, Hyperparameters, LossTerm, ModelKind, WeightedLoss};
use crate::error::{PipelineError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of categorical dimensions a configuration is encoded into
pub const N_DIMENSIONS: usize = 11;

/// Discrete search space for the nested search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    pub model_kinds: Vec<ModelKind>,
    pub loss_sets: Vec<Vec<WeightedLoss>>,
    pub learning_rates: Vec<f64>,
    pub batch_sizes: Vec<usize>,
    pub epochs: Vec<usize>,
    pub vgg_layer_sets: Vec<Vec<u8>>,
    pub flips: Vec<bool>,
    pub rotations: Vec<bool>,
    pub color_jitter: Vec<bool>,
    pub scheduler: Vec<bool>,
    pub freeze_backbone: Vec<bool>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            model_kinds: vec![
                ModelKind::ViT,
                ModelKind::ResNet50,
                ModelKind::ResNet101,
                ModelKind::EfficientNetB0,
                ModelKind::DenseNet121,
                ModelKind::MobileNetV3,
            ],
            loss_sets: vec![
                vec![WeightedLoss::new(LossTerm::Bce, 1.0)],
                vec![WeightedLoss::new(LossTerm::WeightedBce { pos_weight: 3.0 }, 1.0)],
                vec![WeightedLoss::new(LossTerm::Focal { gamma: 2.0 }, 1.0)],
                vec![
                    WeightedLoss::new(LossTerm::Bce, 0.5),
                    WeightedLoss::new(LossTerm::Focal { gamma: 2.0 }, 0.5),
                ],
            ],
            learning_rates: vec![1e-4, 3e-4, 1e-3, 3e-3],
            batch_sizes: vec![16, 32, 64],
            epochs: vec![10, 20, 40],
            vgg_layer_sets: vec![Vec::new()],
            flips: vec![false, true],
            rotations: vec![false, true],
            color_jitter: vec![false],
            scheduler: vec![false, true],
            freeze_backbone: vec![true],
        }
    }
}

impl SearchSpace {
    /// Space for the embedding-level linear probe backend
    pub fn linear_probe() -> Self {
        Self {
            model_kinds: vec![ModelKind::LinearProbe],
            loss_sets: vec![
                vec![WeightedLoss::new(LossTerm::Bce, 1.0)],
                vec![WeightedLoss::new(LossTerm::WeightedBce { pos_weight: 2.0 }, 1.0)],
                vec![WeightedLoss::new(LossTerm::WeightedBce { pos_weight: 4.0 }, 1.0)],
                vec![WeightedLoss::new(LossTerm::Focal { gamma: 2.0 }, 1.0)],
            ],
            learning_rates: vec![0.01, 0.03, 0.1, 0.3],
            batch_sizes: vec![16, 32],
            epochs: vec![20, 50],
            vgg_layer_sets: vec![Vec::new()],
            flips: vec![false],
            rotations: vec![false],
            color_jitter: vec![false, true],
            scheduler: vec![false, true],
            freeze_backbone: vec![true],
        }
    }

    /// Restrict to the given model kinds
    pub fn with_model_kinds(mut self, kinds: Vec<ModelKind>) -> Self {
        self.model_kinds = kinds;
        self
    }

    pub fn with_learning_rates(mut self, lrs: Vec<f64>) -> Self {
        self.learning_rates = lrs;
        self
    }

    pub fn with_loss_sets(mut self, sets: Vec<Vec<WeightedLoss>>) -> Self {
        self.loss_sets = sets;
        self
    }

    fn dimension_sizes(&self) -> [usize; N_DIMENSIONS] {
        [
            self.model_kinds.len(),
            self.loss_sets.len(),
            self.learning_rates.len(),
            self.batch_sizes.len(),
            self.epochs.len(),
            self.vgg_layer_sets.len(),
            self.flips.len(),
            self.rotations.len(),
            self.color_jitter.len(),
            self.scheduler.len(),
            self.freeze_backbone.len(),
        ]
    }

    /// Check every dimension has at least one choice
    pub fn validate(&self) -> Result<()> {
        const NAMES: [&str; N_DIMENSIONS] = [
            "model_kinds",
            "loss_sets",
            "learning_rates",
            "batch_sizes",
            "epochs",
            "vgg_layer_sets",
            "flips",
            "rotations",
            "color_jitter",
            "scheduler",
            "freeze_backbone",
        ];
        for (name, size) in NAMES.iter().zip(self.dimension_sizes()) {
            if size == 0 {
                return Err(PipelineError::ConfigError(format!(
                    "search space dimension '{}' has no choices",
                    name
                )));
            }
        }
        if self.loss_sets.iter().any(|set| set.is_empty()) {
            return Err(PipelineError::ConfigError("empty loss set in search space".to_string()));
        }
        if self.learning_rates.iter().any(|lr| !lr.is_finite() || *lr <= 0.0) {
            return Err(PipelineError::ConfigError("learning rates must be positive".to_string()));
        }
        if self.batch_sizes.contains(&0) || self.epochs.contains(&0) {
            return Err(PipelineError::ConfigError(
                "batch sizes and epochs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of distinct configurations the space can produce
    pub fn cardinality(&self) -> usize {
        self.dimension_sizes()
            .iter()
            .fold(1usize, |acc, &n| acc.saturating_mul(n))
    }

    /// Build the configuration at the given per-dimension choice indices
    pub fn configuration_at(&self, coords: &[usize; N_DIMENSIONS]) -> Configuration {
        let model_kind = self.model_kinds[coords[0]];
        let hyperparameters = Hyperparameters {
            learning_rate: self.learning_rates[coords[2]],
            batch_size: self.batch_sizes[coords[3]],
            epochs: self.epochs[coords[4]],
            image_size: model_kind.default_image_size(),
            augmentation: Augmentation {
                flips: self.flips[coords[6]],
                rotations: self.rotations[coords[7]],
                color_jitter: self.color_jitter[coords[8]],
            },
            vgg_layers: self.vgg_layer_sets[coords[5]].clone(),
            scheduler: self.scheduler[coords[9]],
            freeze_backbone: self.freeze_backbone[coords[10]],
        };

        Configuration {
            model_kind,
            losses: self.loss_sets[coords[1]].clone(),
            hyperparameters,
        }
    }

    /// Sample choice indices uniformly
    pub fn sample_coordinates(&self, rng: &mut impl Rng) -> [usize; N_DIMENSIONS] {
        let sizes = self.dimension_sizes();
        let mut coords = [0usize; N_DIMENSIONS];
        for (c, &n) in coords.iter_mut().zip(sizes.iter()) {
            *c = rng.gen_range(0..n);
        }
        coords
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> Configuration {
        let coords = self.sample_coordinates(rng);
        self.configuration_at(&coords)
    }

    /// Encode a configuration back into choice indices.
    ///
    /// Dimensions whose value is not among the choices map to `None`.
    pub fn coordinates_of(&self, config: &Configuration) -> [Option<usize>; N_DIMENSIONS] {
        let hp = &config.hyperparameters;
        [
            self.model_kinds.iter().position(|k| *k == config.model_kind),
            self.loss_sets.iter().position(|s| *s == config.losses),
            self.learning_rates
                .iter()
                .position(|lr| lr.to_bits() == hp.learning_rate.to_bits()),
            self.batch_sizes.iter().position(|b| *b == hp.batch_size),
            self.epochs.iter().position(|e| *e == hp.epochs),
            self.vgg_layer_sets.iter().position(|v| *v == hp.vgg_layers),
            self.flips.iter().position(|f| *f == hp.augmentation.flips),
            self.rotations.iter().position(|f| *f == hp.augmentation.rotations),
            self.color_jitter.iter().position(|f| *f == hp.augmentation.color_jitter),
            self.scheduler.iter().position(|f| *f == hp.scheduler),
            self.freeze_backbone.iter().position(|f| *f == hp.freeze_backbone),
        ]
    }
}

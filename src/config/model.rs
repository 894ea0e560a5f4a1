//! Configuration data model: model kind, loss set and hyperparameters
//!
//! A [`Configuration`] is identified by its full value. Floating-point fields
//! are compared and hashed by bit pattern so configurations can be used as
//! map keys when deduplicating the candidate pool.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Interchangeable classifier backbones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    /// Vision Transformer B/16
    ViT,
    /// Vision Transformer B/32
    ViT32,
    ResNet50,
    ResNet101,
    EfficientNetB0,
    EfficientNetB4,
    MobileNetV3,
    DenseNet121,
    /// Logistic head over pre-extracted embeddings
    LinearProbe,
}

impl ModelKind {
    /// All known kinds, in declaration order
    pub const ALL: [ModelKind; 9] = [
        ModelKind::ViT,
        ModelKind::ViT32,
        ModelKind::ResNet50,
        ModelKind::ResNet101,
        ModelKind::EfficientNetB0,
        ModelKind::EfficientNetB4,
        ModelKind::MobileNetV3,
        ModelKind::DenseNet121,
        ModelKind::LinearProbe,
    ];

    /// Input resolution the backbone was pretrained at
    pub fn default_image_size(self) -> u32 {
        match self {
            ModelKind::EfficientNetB4 => 380,
            _ => 224,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::ViT => "vit",
            ModelKind::ViT32 => "vit32",
            ModelKind::ResNet50 => "resnet50",
            ModelKind::ResNet101 => "resnet101",
            ModelKind::EfficientNetB0 => "efficientnet_b0",
            ModelKind::EfficientNetB4 => "efficientnet_b4",
            ModelKind::MobileNetV3 => "mobilenet_v3",
            ModelKind::DenseNet121 => "densenet121",
            ModelKind::LinearProbe => "linear_probe",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.to_ascii_lowercase().replace('-', "_");
        ModelKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| PipelineError::ConfigError(format!("Unknown model kind: {}", s)))
    }
}

/// A single loss term
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossTerm {
    /// Binary cross-entropy
    Bce,
    /// Binary cross-entropy with the positive class up-weighted
    WeightedBce { pos_weight: f64 },
    /// Focal loss, down-weights easy examples
    Focal { gamma: f64 },
    /// Feature-space loss over the configured VGG layers
    Perceptual,
}

impl LossTerm {
    fn identity(&self) -> (u8, u64) {
        match self {
            LossTerm::Bce => (0, 0),
            LossTerm::WeightedBce { pos_weight } => (1, pos_weight.to_bits()),
            LossTerm::Focal { gamma } => (2, gamma.to_bits()),
            LossTerm::Perceptual => (3, 0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossTerm::Bce => "bce",
            LossTerm::WeightedBce { .. } => "weighted_bce",
            LossTerm::Focal { .. } => "focal",
            LossTerm::Perceptual => "perceptual",
        }
    }
}

impl PartialEq for LossTerm {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for LossTerm {}

impl Hash for LossTerm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// A loss term with its mixing weight
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightedLoss {
    pub term: LossTerm,
    pub weight: f64,
}

impl WeightedLoss {
    pub fn new(term: LossTerm, weight: f64) -> Self {
        Self { term, weight }
    }
}

impl PartialEq for WeightedLoss {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.weight.to_bits() == other.weight.to_bits()
    }
}

impl Eq for WeightedLoss {}

impl Hash for WeightedLoss {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.term.hash(state);
        self.weight.to_bits().hash(state);
    }
}

/// Augmentation switches applied by the image pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Augmentation {
    pub flips: bool,
    pub rotations: bool,
    pub color_jitter: bool,
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    pub image_size: u32,
    pub augmentation: Augmentation,
    /// VGG layer indices used by [`LossTerm::Perceptual`]
    pub vgg_layers: Vec<u8>,
    /// Cosine learning-rate decay
    pub scheduler: bool,
    /// Train only the classification head
    pub freeze_backbone: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            batch_size: 32,
            epochs: 20,
            image_size: 224,
            augmentation: Augmentation::default(),
            vgg_layers: Vec::new(),
            scheduler: false,
            freeze_backbone: true,
        }
    }
}

impl PartialEq for Hyperparameters {
    fn eq(&self, other: &Self) -> bool {
        self.learning_rate.to_bits() == other.learning_rate.to_bits()
            && self.batch_size == other.batch_size
            && self.epochs == other.epochs
            && self.image_size == other.image_size
            && self.augmentation == other.augmentation
            && self.vgg_layers == other.vgg_layers
            && self.scheduler == other.scheduler
            && self.freeze_backbone == other.freeze_backbone
    }
}

impl Eq for Hyperparameters {}

impl Hash for Hyperparameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.learning_rate.to_bits().hash(state);
        self.batch_size.hash(state);
        self.epochs.hash(state);
        self.image_size.hash(state);
        self.augmentation.hash(state);
        self.vgg_layers.hash(state);
        self.scheduler.hash(state);
        self.freeze_backbone.hash(state);
    }
}

/// One point of the search: model kind, loss set and hyperparameters.
///
/// Immutable once a trial starts. Two configurations are the same candidate
/// iff every field is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub model_kind: ModelKind,
    pub losses: Vec<WeightedLoss>,
    pub hyperparameters: Hyperparameters,
}

impl Configuration {
    pub fn new(model_kind: ModelKind) -> Self {
        let hyperparameters = Hyperparameters {
            image_size: model_kind.default_image_size(),
            ..Hyperparameters::default()
        };
        Self {
            model_kind,
            losses: vec![WeightedLoss::new(LossTerm::Bce, 1.0)],
            hyperparameters,
        }
    }

    pub fn with_losses(mut self, losses: Vec<WeightedLoss>) -> Self {
        self.losses = losses;
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.hyperparameters.learning_rate = lr;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.hyperparameters.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.hyperparameters.batch_size = batch_size;
        self
    }

    /// Compact human-readable label for logs and reports
    pub fn label(&self) -> String {
        let losses: Vec<&str> = self.losses.iter().map(|l| l.term.name()).collect();
        format!(
            "{}[{}] lr={:e} bs={} ep={}{}",
            self.model_kind,
            losses.join("+"),
            self.hyperparameters.learning_rate,
            self.hyperparameters.batch_size,
            self.hyperparameters.epochs,
            if self.hyperparameters.scheduler { " sched" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_configuration_identity_is_full_value() {
        let a = Configuration::new(ModelKind::ResNet50).with_learning_rate(1e-4);
        let b = Configuration::new(ModelKind::ResNet50).with_learning_rate(1e-4);
        let c = Configuration::new(ModelKind::ResNet50).with_learning_rate(2e-4);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Configuration> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_loss_parameters_participate_in_identity() {
        let focal_2 = Configuration::new(ModelKind::ViT)
            .with_losses(vec![WeightedLoss::new(LossTerm::Focal { gamma: 2.0 }, 1.0)]);
        let focal_3 = Configuration::new(ModelKind::ViT)
            .with_losses(vec![WeightedLoss::new(LossTerm::Focal { gamma: 3.0 }, 1.0)]);
        assert_ne!(focal_2, focal_3);
    }

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("ResNet50".parse::<ModelKind>().unwrap(), ModelKind::ResNet50);
        assert_eq!("efficientnet-b4".parse::<ModelKind>().unwrap(), ModelKind::EfficientNetB4);
        assert!("alexnet".parse::<ModelKind>().is_err());
        assert_eq!(ModelKind::EfficientNetB4.default_image_size(), 380);
    }

    #[test]
    fn test_configuration_json_roundtrip_preserves_identity() {
        let config = Configuration::new(ModelKind::DenseNet121)
            .with_losses(vec![
                WeightedLoss::new(LossTerm::WeightedBce { pos_weight: 3.0 }, 0.7),
                WeightedLoss::new(LossTerm::Perceptual, 0.3),
            ]);
        let json = serde_json::to_string(&config).unwrap();
        let back: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}

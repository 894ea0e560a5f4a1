//! Linear probe backend: a logistic head trained over pre-extracted
//! embeddings with mini-batch gradient descent.
//!
//! Fits only [`ModelKind::LinearProbe`] configurations; image backbones
//! need a backend that owns the network. Honours learning rate, batch size, epochs, cosine scheduling, the loss set
//! and colour jitter (as feature noise). Geometric augmentation, image size
//! and perceptual loss have no meaning on embeddings and are ignored.

use super::{ProbabilityModel, TrainableModel};
use crate::config::{Configuration, LossTerm, ModelKind, WeightedLoss};
use crate::data::Dataset;
use crate::error::{PipelineError, Result, TrainingFailure};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// L2 penalty on the weights
const L2_ALPHA: f64 = 1e-4;

/// Amplitude of the uniform noise used for colour jitter
const JITTER_AMPLITUDE: f64 = 0.1;

/// Fitted logistic head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeModel {
    pub model_kind: ModelKind,
    pub weights: Array1<f64>,
    pub bias: f64,
    /// Per-feature standardization fitted on the training data
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl ProbeModel {
    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }
}

impl ProbabilityModel for ProbeModel {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.weights.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.weights.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let xs = (x - &self.mean) / &self.scale;
        Ok(Self::sigmoid(&(xs.dot(&self.weights) + self.bias)))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Gradient of the mixed loss with respect to the logit, per sample
fn logit_gradient(losses: &[WeightedLoss], p: &Array1<f64>, y: &Array1<f64>) -> Array1<f64> {
    let mut grad = Array1::zeros(p.len());
    for loss in losses {
        let term = match loss.term {
            LossTerm::Bce => p - y,
            LossTerm::WeightedBce { pos_weight } => {
                ndarray::Zip::from(p).and(y).map_collect(|&p, &y| {
                    pos_weight * y * (p - 1.0) + (1.0 - y) * p
                })
            }
            // Modulating factor treated as constant
            LossTerm::Focal { gamma } => ndarray::Zip::from(p).and(y).map_collect(|&p, &y| {
                let pt = if y > 0.5 { p } else { 1.0 - p };
                (1.0 - pt).powf(gamma) * (p - y)
            }),
            LossTerm::Perceptual => continue,
        };
        grad = grad + loss.weight * term;
    }
    grad
}

/// Logistic-head backend over embedding features
#[derive(Debug, Clone, Default)]
pub struct LinearProbe;

impl LinearProbe {
    pub fn new() -> Self {
        Self
    }
}

impl TrainableModel for LinearProbe {
    fn name(&self) -> &str {
        "linear_probe"
    }

    fn supports(&self, kind: ModelKind) -> bool {
        kind == ModelKind::LinearProbe
    }

    fn train(
        &self,
        config: &Configuration,
        data: &Dataset,
        seed: u64,
    ) -> std::result::Result<Box<dyn ProbabilityModel>, TrainingFailure> {
        if !self.supports(config.model_kind) {
            return Err(TrainingFailure::Backend(format!(
                "linear probe cannot train {}",
                config.model_kind
            )));
        }
        if data.is_empty() {
            return Err(TrainingFailure::Backend("empty training set".to_string()));
        }
        if !config.losses.iter().any(|l| l.term != LossTerm::Perceptual) {
            return Err(TrainingFailure::Backend(
                "no loss term applicable to embeddings".to_string(),
            ));
        }

        let hp = &config.hyperparameters;
        let x = data.features();
        let y = data.labels().mapv(f64::from);
        let n_samples = x.nrows();

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| TrainingFailure::Backend("cannot standardize empty data".to_string()))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let xs = (x - &mean) / &scale;

        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..n_samples).collect();

        let batch_size = hp.batch_size.max(1);
        let steps_per_epoch = (n_samples + batch_size - 1) / batch_size;
        let total_steps = (hp.epochs * steps_per_epoch).max(1);
        let mut step = 0usize;

        for epoch in 0..hp.epochs {
            order.shuffle(&mut rng);

            for batch in order.chunks(batch_size) {
                let mut xb = xs.select(Axis(0), batch);
                if hp.augmentation.color_jitter {
                    xb.mapv_inplace(|v| v + (rng.gen::<f64>() - 0.5) * 2.0 * JITTER_AMPLITUDE);
                }
                let yb = y.select(Axis(0), batch);

                let p = ProbeModel::sigmoid(&(xb.dot(&weights) + bias));
                let g = logit_gradient(&config.losses, &p, &yb);

                let dw = xb.t().dot(&g) / batch.len() as f64 + L2_ALPHA * &weights;
                let db = g.mean().unwrap_or(0.0);

                let lr = if hp.scheduler {
                    hp.learning_rate * 0.5 * (1.0 + (PI * step as f64 / total_steps as f64).cos())
                } else {
                    hp.learning_rate
                };

                weights = weights - lr * dw;
                bias -= lr * db;
                step += 1;
            }

            if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
                return Err(TrainingFailure::Diverged { epoch: epoch + 1 });
            }
        }

        Ok(Box::new(ProbeModel {
            model_kind: config.model_kind,
            weights,
            bias,
            mean,
            scale,
        }))
    }

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn ProbabilityModel>> {
        let model: ProbeModel = bincode::deserialize(bytes)?;
        Ok(Box::new(model))
    }
}

//! Inference over the deployed ensemble

use super::voting::VotingClassifier;
use crate::config::Configuration;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};
use crate::retrain::{DeploymentModel, Stage};
use crate::scoring::{ScoreReport, ScoringEngine};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-sample audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSample {
    pub id: String,
    /// Class-1 probability from each model, in ensemble order
    pub probabilities: Vec<f64>,
    /// Thresholded decision from each model
    pub decisions: Vec<u8>,
    /// Majority of `decisions`
    pub label: u8,
}

/// Thresholded majority vote over exactly K final models
#[derive(Debug)]
pub struct EnsemblePredictor {
    members: Vec<DeploymentModel>,
    voting: VotingClassifier,
}

impl EnsemblePredictor {
    /// Build from exactly `k` models, all in the final stage
    pub fn new(members: Vec<DeploymentModel>, k: usize, threshold: f64) -> Result<Self> {
        if members.len() != k {
            return Err(PipelineError::MissingDeploymentModel(format!(
                "ensemble needs exactly {} final models, got {}",
                k,
                members.len()
            )));
        }
        if let Some(m) = members.iter().find(|m| m.stage != Stage::Final) {
            return Err(PipelineError::Lifecycle(format!(
                "{} is {}, only final models may serve predictions",
                m.configuration.label(),
                m.stage
            )));
        }
        Ok(Self {
            members,
            voting: VotingClassifier::new(threshold),
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.voting.threshold()
    }

    pub fn members(&self) -> &[DeploymentModel] {
        &self.members
    }

    pub fn configurations(&self) -> Vec<&Configuration> {
        self.members.iter().map(|m| &m.configuration).collect()
    }

    /// Per-model probabilities, one array per member
    fn member_probabilities(&self, x: &Array2<f64>) -> Result<Vec<Array1<f64>>> {
        self.members
            .par_iter()
            .map(|m| m.model.predict_rows(x))
            .collect()
    }

    /// Final labels only
    pub fn predict_labels(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        let probabilities = self.member_probabilities(x)?;
        let (_, labels) = self.voting.predict_from_predictions(&probabilities)?;
        Ok(labels)
    }

    /// Audit records for every row of `x`
    pub fn predict(&self, ids: &[String], x: &Array2<f64>) -> Result<Vec<PredictionSample>> {
        if ids.len() != x.nrows() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} ids", x.nrows()),
                actual: format!("{} ids", ids.len()),
            });
        }

        let probabilities = self.member_probabilities(x)?;
        let (decisions, labels) = self.voting.predict_from_predictions(&probabilities)?;

        let samples: Vec<PredictionSample> = ids
            .par_iter()
            .enumerate()
            .map(|(i, id)| PredictionSample {
                id: id.clone(),
                probabilities: probabilities.iter().map(|p| p[i]).collect(),
                decisions: decisions.row(i).to_vec(),
                label: labels[i],
            })
            .collect();

        debug!(samples = samples.len(), models = self.len(), "ensemble predictions produced");
        Ok(samples)
    }

    /// Score the ensemble's labels against a labelled dataset
    pub fn evaluate(&self, data: &Dataset) -> Result<ScoreReport> {
        let labels = self.predict_labels(data.features())?;
        ScoringEngine::new().score(&data.labels().to_vec(), &labels.to_vec())
    }
}

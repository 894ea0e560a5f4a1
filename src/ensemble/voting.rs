//! Thresholded majority voting

use crate::config::DEFAULT_DECISION_THRESHOLD;
use crate::error::{PipelineError, Result};
use crate::scoring::decide;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Hard-voting classifier over per-model class-1 probabilities.
///
/// Each model votes 1 iff its probability is at least the threshold; the
/// sample is labelled 1 iff strictly more than half of the models voted 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VotingClassifier {
    threshold: f64,
}

impl Default for VotingClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_DECISION_THRESHOLD)
    }
}

impl VotingClassifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Majority of binary decisions. An even split resolves to 0.
    pub fn majority(decisions: &[u8]) -> u8 {
        let ones = decisions.iter().filter(|&&d| d == 1).count();
        if ones * 2 > decisions.len() { 1 } else { 0 }
    }

    /// Decisions and final label for one sample's per-model probabilities
    pub fn vote(&self, probabilities: &[f64]) -> (Vec<u8>, u8) {
        let decisions: Vec<u8> = probabilities.iter().map(|&p| decide(p, self.threshold)).collect();
        let label = Self::majority(&decisions);
        (decisions, label)
    }

    /// Vote over raw predictions, one array per model.
    ///
    /// Returns the (n_samples × n_models) decision matrix and the final labels.
    pub fn predict_from_predictions(&self, predictions: &[Array1<f64>]) -> Result<(Array2<u8>, Array1<u8>)> {
        if predictions.is_empty() {
            return Err(PipelineError::InvalidInput("No predictions provided".to_string()));
        }

        let n_samples = predictions[0].len();
        let n_models = predictions.len();
        if let Some(bad) = predictions.iter().find(|p| p.len() != n_samples) {
            return Err(PipelineError::ShapeError {
                expected: format!("{} predictions per model", n_samples),
                actual: format!("{} predictions", bad.len()),
            });
        }

        let decisions = Array2::from_shape_fn((n_samples, n_models), |(i, m)| {
            decide(predictions[m][i], self.threshold)
        });
        let labels = Array1::from_shape_fn(n_samples, |i| {
            let row = decisions.row(i);
            let ones = row.iter().filter(|&&d| d == 1).count();
            if ones * 2 > n_models { 1 } else { 0 }
        });

        Ok((decisions, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_three_of_five_wins() {
        assert_eq!(VotingClassifier::majority(&[1, 1, 0, 1, 0]), 1);
        assert_eq!(VotingClassifier::majority(&[1, 0, 0, 1, 0]), 0);
        assert_eq!(VotingClassifier::majority(&[1, 1, 1, 1, 1]), 1);
        assert_eq!(VotingClassifier::majority(&[0, 0, 0, 0, 0]), 0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let voter = VotingClassifier::default();
        let (decisions, label) = voter.vote(&[0.70, 0.70, 0.6999999, 0.95, 0.1]);
        assert_eq!(decisions, vec![1, 1, 0, 1, 0]);
        assert_eq!(label, 1);
    }

    #[test]
    fn test_high_average_does_not_override_votes() {
        // Mean probability is 0.72 but only two models clear the threshold
        let voter = VotingClassifier::default();
        let (_, label) = voter.vote(&[0.99, 0.99, 0.69, 0.69, 0.24]);
        assert_eq!(label, 0);
    }

    #[test]
    fn test_predict_from_predictions() {
        let voter = VotingClassifier::new(0.7);
        let preds = vec![
            array![0.9, 0.1],
            array![0.8, 0.2],
            array![0.7, 0.9],
            array![0.1, 0.9],
            array![0.2, 0.3],
        ];
        let (decisions, labels) = voter.predict_from_predictions(&preds).unwrap();
        assert_eq!(decisions.shape(), &[2, 5]);
        assert_eq!(decisions.row(0).to_vec(), vec![1, 1, 1, 0, 0]);
        assert_eq!(labels, array![1, 0]);
    }

    #[test]
    fn test_ragged_predictions_rejected() {
        let voter = VotingClassifier::default();
        let preds = vec![array![0.9, 0.1], array![0.8]];
        assert!(voter.predict_from_predictions(&preds).is_err());
    }
}

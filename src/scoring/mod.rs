//! Joint-label scoring
//!
//! score = (a0 · a1) / (n0 · n1), where n0/n1 count true class-0/class-1
//! samples and a0/a1 count correct predictions within each class. A model
//! that misses one class completely scores 0 no matter how well it does on
//! the other, which is what every ranking upstream optimises for.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Per-class counts together with the score they produce.
///
/// Reports always travel with their counts: the score alone cannot be
/// inverted back to per-class performance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub n0: usize,
    pub n1: usize,
    pub a0: usize,
    pub a1: usize,
    pub score: f64,
}

impl ScoreReport {
    /// Build a report from raw counts.
    ///
    /// Returns score 0 (with a warning) when either class is absent, and
    /// `InvalidInput` when a class has more correct predictions than samples.
    pub fn from_counts(n0: usize, n1: usize, a0: usize, a1: usize) -> Result<Self> {
        Ok(Self {
            n0,
            n1,
            a0,
            a1,
            score: joint_score(n0, n1, a0, a1)?,
        })
    }

    /// Report for a fold or configuration that could not be evaluated
    pub fn failed(n0: usize, n1: usize) -> Self {
        Self { n0, n1, a0: 0, a1: 0, score: 0.0 }
    }

    /// Fraction of class-0 samples predicted correctly
    pub fn class0_recall(&self) -> f64 {
        if self.n0 == 0 { 0.0 } else { self.a0 as f64 / self.n0 as f64 }
    }

    /// Fraction of class-1 samples predicted correctly
    pub fn class1_recall(&self) -> f64 {
        if self.n1 == 0 { 0.0 } else { self.a1 as f64 / self.n1 as f64 }
    }
}

impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "score={:.4} (a0={}/n0={}, a1={}/n1={})",
            self.score, self.a0, self.n0, self.a1, self.n1
        )
    }
}

/// (a0 · a1) / (n0 · n1), or 0 when the denominator is zero.
///
/// Counts with `a0 > n0` or `a1 > n1` are rejected.
pub fn joint_score(n0: usize, n1: usize, a0: usize, a1: usize) -> Result<f64> {
    if a0 > n0 || a1 > n1 {
        return Err(PipelineError::InvalidInput(format!(
            "correct counts exceed class sizes: a0={}/n0={}, a1={}/n1={}",
            a0, n0, a1, n1
        )));
    }
    if n0 == 0 || n1 == 0 {
        warn!(n0, n1, "zero-denominator score: evaluation batch lacks a class, scoring 0");
        return Ok(0.0);
    }
    Ok((a0 as f64 * a1 as f64) / (n0 as f64 * n1 as f64))
}

/// Stateless scorer over aligned label sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score predicted labels against ground truth.
    ///
    /// Both slices must have the same length and contain only 0 or 1.
    pub fn score(&self, y_true: &[u8], y_pred: &[u8]) -> Result<ScoreReport> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }

        let (mut n0, mut n1, mut a0, mut a1) = (0usize, 0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            if t > 1 || p > 1 {
                return Err(PipelineError::InvalidInput(format!(
                    "labels must be 0 or 1, got truth={} prediction={}",
                    t, p
                )));
            }
            match (t, p) {
                (0, 0) => { n0 += 1; a0 += 1; }
                (0, _) => n0 += 1,
                (_, 1) => { n1 += 1; a1 += 1; }
                _ => n1 += 1,
            }
        }

        ScoreReport::from_counts(n0, n1, a0, a1)
    }

    /// Threshold class-1 probabilities (inclusive) and score the result
    pub fn score_probabilities(
        &self,
        y_true: &[u8],
        probabilities: &[f64],
        threshold: f64,
    ) -> Result<ScoreReport> {
        let y_pred: Vec<u8> = probabilities
            .iter()
            .map(|&p| decide(p, threshold))
            .collect();
        self.score(y_true, &y_pred)
    }
}

/// Binary decision for one probability: class 1 iff `p >= threshold`
#[inline]
pub fn decide(probability: f64, threshold: f64) -> u8 {
    if probability >= threshold { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_scenario() {
        let report = ScoreReport::from_counts(100, 50, 90, 40).unwrap();
        assert!((report.score - 0.72).abs() < 1e-12);
    }

    #[test]
    fn test_missing_class_one_scores_zero() {
        let y_true = [0, 0, 0, 1, 1];
        let y_pred = [0, 0, 0, 0, 0];
        let report = ScoringEngine::new().score(&y_true, &y_pred).unwrap();
        assert_eq!(report.a0, 3);
        assert_eq!(report.a1, 0);
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn test_zero_denominator_is_zero_not_nan() {
        let report = ScoringEngine::new().score(&[1, 1, 1], &[1, 1, 1]).unwrap();
        assert_eq!(report.n0, 0);
        assert_eq!(report.score, 0.0);
        assert!(!report.score.is_nan());

        assert_eq!(joint_score(0, 0, 0, 0).unwrap(), 0.0);
        assert_eq!(ScoringEngine::new().score(&[], &[]).unwrap().score, 0.0);
    }

    #[test]
    fn test_score_in_unit_interval_over_grid() {
        for n0 in 1..6 {
            for n1 in 1..6 {
                for a0 in 0..=n0 {
                    for a1 in 0..=n1 {
                        let s = joint_score(n0, n1, a0, a1).unwrap();
                        assert!((0.0..=1.0).contains(&s));
                        let expected = (a0 * a1) as f64 / (n0 * n1) as f64;
                        assert!((s - expected).abs() < 1e-12);
                        if a0 == 0 || a1 == 0 {
                            assert_eq!(s, 0.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_counts_beyond_class_size_rejected() {
        assert!(matches!(
            ScoreReport::from_counts(1, 1, 2, 2),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(ScoreReport::from_counts(3, 2, 3, 3).is_err());
        assert!(joint_score(0, 5, 1, 5).is_err());
        assert_eq!(ScoreReport::from_counts(3, 2, 3, 2).unwrap().score, 1.0);
    }

    #[test]
    fn test_perfect_predictions_score_one() {
        let y = [0, 1, 0, 1, 1];
        assert_eq!(ScoringEngine::new().score(&y, &y).unwrap().score, 1.0);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let err = ScoringEngine::new().score(&[0, 1], &[0]).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeError { .. }));
    }

    #[test]
    fn test_non_binary_label_is_error() {
        let err = ScoringEngine::new().score(&[0, 2], &[0, 1]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(decide(0.70, 0.70), 1);
        assert_eq!(decide(0.6999999, 0.70), 0);
    }
}

//! Integration tests for the joint-label score and the per-model decision rule

use cell_ensemble::ensemble::VotingClassifier;
use cell_ensemble::scoring::{decide, joint_score, ScoreReport, ScoringEngine};
use cell_ensemble::training::CVResults;
use cell_ensemble::PipelineError;

fn labels(n0: usize, n1: usize, a0: usize, a1: usize) -> (Vec<u8>, Vec<u8>) {
    let mut y_true = Vec::new();
    let mut y_pred = Vec::new();
    for i in 0..n0 {
        y_true.push(0);
        y_pred.push(if i < a0 { 0 } else { 1 });
    }
    for i in 0..n1 {
        y_true.push(1);
        y_pred.push(if i < a1 { 1 } else { 0 });
    }
    (y_true, y_pred)
}

// ============================================================================
// Score formula
// ============================================================================

#[test]
fn test_formula_over_grid() {
    for n0 in 1..=6 {
        for n1 in 1..=6 {
            for a0 in 0..=n0 {
                for a1 in 0..=n1 {
                    let score = joint_score(n0, n1, a0, a1).unwrap();
                    let expected = (a0 * a1) as f64 / (n0 * n1) as f64;
                    assert_eq!(score, expected);
                    assert!((0.0..=1.0).contains(&score));
                    if a0 == 0 || a1 == 0 {
                        assert_eq!(score, 0.0);
                    }
                }
            }
        }
    }
}

#[test]
fn test_reference_scenario_from_labels() {
    let (y_true, y_pred) = labels(100, 50, 90, 40);
    let report = ScoringEngine::new().score(&y_true, &y_pred).unwrap();
    assert_eq!((report.n0, report.n1, report.a0, report.a1), (100, 50, 90, 40));
    assert!((report.score - 0.72).abs() < 1e-12);
}

#[test]
fn test_all_positives_missed_scores_zero() {
    for a0 in [0, 37, 100] {
        let (y_true, y_pred) = labels(100, 50, a0, 0);
        let report = ScoringEngine::new().score(&y_true, &y_pred).unwrap();
        assert_eq!(report.a1, 0);
        assert_eq!(report.score, 0.0);
    }
}

#[test]
fn test_single_class_batch_scores_zero_not_nan() {
    let engine = ScoringEngine::new();

    let only_zeros = engine.score(&[0, 0, 0], &[0, 0, 0]).unwrap();
    assert_eq!(only_zeros.n1, 0);
    assert_eq!(only_zeros.score, 0.0);

    let only_ones = engine.score(&[1, 1], &[1, 1]).unwrap();
    assert_eq!(only_ones.n0, 0);
    assert_eq!(only_ones.score, 0.0);

    let empty = engine.score(&[], &[]).unwrap();
    assert!(!empty.score.is_nan());
    assert_eq!(empty.score, 0.0);
}

#[test]
fn test_malformed_inputs_are_errors() {
    let engine = ScoringEngine::new();
    assert!(matches!(engine.score(&[0, 1], &[0]), Err(PipelineError::ShapeError { .. })));
    assert!(matches!(engine.score(&[0, 2], &[0, 1]), Err(PipelineError::InvalidInput(_))));
}

#[test]
fn test_impossible_counts_never_score_above_one() {
    for (n0, n1, a0, a1) in [(1, 1, 2, 2), (10, 5, 11, 5), (10, 5, 10, 6), (0, 3, 1, 3)] {
        assert!(matches!(
            ScoreReport::from_counts(n0, n1, a0, a1),
            Err(PipelineError::InvalidInput(_))
        ));
    }
}

#[test]
fn test_report_display_carries_counts() {
    let text = ScoreReport::from_counts(100, 50, 90, 40).unwrap().to_string();
    assert!(text.contains("0.7200"));
    assert!(text.contains("a0=90/n0=100"));
    assert!(text.contains("a1=40/n1=50"));
}

// ============================================================================
// Decision threshold and vote
// ============================================================================

#[test]
fn test_threshold_boundary() {
    assert_eq!(decide(0.70, 0.70), 1);
    assert_eq!(decide(0.6999999, 0.70), 0);
    assert_eq!(decide(1.0, 0.70), 1);
    assert_eq!(decide(0.0, 0.70), 0);
}

#[test]
fn test_probabilities_scored_with_inclusive_threshold() {
    let report = ScoringEngine::new()
        .score_probabilities(&[1, 1, 0, 0], &[0.70, 0.6999999, 0.2, 0.70], 0.70)
        .unwrap();
    assert_eq!((report.a0, report.a1), (1, 1));
    assert_eq!(report.score, 0.25);
}

#[test]
fn test_majority_of_five() {
    assert_eq!(VotingClassifier::majority(&[1, 1, 0, 1, 0]), 1);
    assert_eq!(VotingClassifier::majority(&[0, 1, 0, 1, 0]), 0);
}

// ============================================================================
// Fold aggregation
// ============================================================================

#[test]
fn test_fold_mean_invariant_to_order() {
    let folds = vec![0.72, 0.0, 0.3333333333333333, 0.9, 0.1];
    let reference = CVResults::from_scores(folds.clone()).mean_score;

    // Every rotation and the reversal give the same bits
    for shift in 0..folds.len() {
        let mut rotated = folds.clone();
        rotated.rotate_left(shift);
        assert_eq!(CVResults::from_scores(rotated.clone()).mean_score.to_bits(), reference.to_bits());
        rotated.reverse();
        assert_eq!(CVResults::from_scores(rotated).mean_score.to_bits(), reference.to_bits());
    }
}

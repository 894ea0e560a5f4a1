//! Ensemble selection and inference
//!
//! - [`selector`] - deduplicate the candidate pool and keep the top K
//! - [`voting`] - per-model threshold and majority vote
//! - [`predictor`] - inference over exactly K final models

mod predictor;
mod selector;
mod voting;

pub use predictor::{EnsemblePredictor, PredictionSample};
pub use selector::{EnsembleSelector, RankedCandidate, ScoreAggregation};
pub use voting::VotingClassifier;

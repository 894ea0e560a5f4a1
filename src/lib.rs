//! Cell Ensemble - model selection and ensembling for binary cell classification
//!
//! This crate picks, retrains and combines classifiers for a heavily
//! imbalanced binary task scored by the joint-label rule
//! `(a0 · a1) / (n0 · n1)`:
//! - Nested cross-validated search over model kind × loss set × hyperparameters
//! - Deterministic top-K retention of distinct configurations
//! - Two-phase retraining (validate, then refit on train ∪ validation)
//! - Thresholded (≥ 0.70) per-model decisions combined by majority vote
//!
//! # Modules
//!
//! ## Core
//! - [`scoring`] - Joint-label score and reports
//! - [`search`] - Search space, samplers, trial runner, nested optimizer
//! - [`ensemble`] - Top-K selection and majority-vote inference
//! - [`retrain`] - Validate/finalize lifecycle
//!
//! ## Supporting
//! - [`config`] - Configurations and pipeline settings
//! - [`data`] - Labelled datasets, stratified holdout, CSV loading
//! - [`training`] - Trainable-model capability, cross-validation, linear probe
//! - [`registry`] - Persisted deployment records and artifacts
//! - [`pipeline`] - End-to-end orchestration
//!
//! ## Services
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core
pub mod scoring;
pub mod search;
pub mod ensemble;
pub mod retrain;

// Supporting
pub mod config;
pub mod data;
pub mod training;
pub mod registry;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{PipelineError, Result, TrainingFailure};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result, TrainingFailure};

    // Configuration
    pub use crate::config::{
        Configuration, Hyperparameters, LossTerm, ModelKind, PipelineConfig, WeightedLoss,
        DEFAULT_DECISION_THRESHOLD, DEFAULT_ENSEMBLE_SIZE,
    };

    // Data
    pub use crate::data::{Dataset, FeatureTable};

    // Scoring
    pub use crate::scoring::{ScoreReport, ScoringEngine};

    // Training
    pub use crate::training::{LinearProbe, ProbabilityModel, TrainableModel};

    // Search
    pub use crate::search::{CancelToken, NestedSearchOptimizer, SamplerType, SearchReport, SearchSpace, TrialRunner};

    // Ensemble
    pub use crate::ensemble::{EnsemblePredictor, EnsembleSelector, PredictionSample, RankedCandidate, ScoreAggregation};

    // Retraining
    pub use crate::retrain::{DeploymentModel, ModelRetrainer, Stage};

    // Registry
    pub use crate::registry::DeploymentRegistry;

    // Pipeline
    pub use crate::pipeline::{PipelineOutcome, SelectionPipeline};
}

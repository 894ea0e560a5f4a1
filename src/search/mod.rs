//! Nested configuration search
//!
//! - [`space`] - discrete search space over configurations
//! - [`sampler`] - proposal strategies (random, TPE)
//! - [`trial`] - inner stratified k-fold evaluation of one configuration
//! - [`optimizer`] - outer folds, candidate pool, termination and cancellation

pub mod optimizer;
pub mod sampler;
pub mod space;
pub mod trial;

pub use optimizer::{
    Candidate, CandidatePool, CancelToken, NestedSearchOptimizer, OuterFoldReport, SearchReport, StopReason,
};
pub use sampler::{create_sampler, ConfigSampler, RandomSampler, SamplerType, TpeSampler};
pub use space::{SearchSpace, N_DIMENSIONS};
pub use trial::{Trial, TrialOutcome, TrialRunner};

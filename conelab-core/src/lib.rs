//! ConeLab Core — return series, Bayesian return models, and inference.
//!
//! - Domain types (return series, posterior traces)
//! - Model specs for the four return models, built through a closed `ModelKind`
//! - Log densities and draws for the distribution families involved
//! - Powell MAP search and curvature-scaled NUTS sampling
//! - Deterministic seed hierarchy for reproducible runs

pub mod bindings;
pub mod distributions;
pub mod domain;
pub mod inference;
pub mod model;
pub mod rng;
pub mod stats;
pub mod transform;

pub use bindings::DataBindings;
pub use domain::{
    cum_returns, ColumnSummary, LatentBlock, PosteriorTrace, ReturnSeries, SamplerStats,
    SeriesError,
};
pub use inference::{infer, InferenceConfig, InferenceError};
pub use model::{ModelError, ModelKind, ModelSpec};

//! ConeLab Runner — model lifecycle, dispatch, and cone analytics.
//!
//! This crate builds on `conelab-core` to provide:
//! - A shared-variable store and a controller that builds each model once
//! - Name-based dispatch from return series to model inputs
//! - Percentile cones and consistency scores over simulated returns
//! - The cone orchestration entry point with a pluggable renderer
//! - BEST posterior summaries
//! - TOML configuration and profiling scopes

pub mod bayes_cone;
pub mod best_summary;
pub mod cone;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod profiling;
pub mod store;

pub use bayes_cone::{plot_bayes_cone, ConePlot, ConeRenderer, ConeRequest, RenderError};
pub use best_summary::{analyze_best, BestSummary, SummaryError};
pub use cone::{
    compute_bayes_cone, compute_consistency_score, cumulative_paths, ConeError,
    ConePercentiles, CONE_LEVELS,
};
pub use config::{ConfigError, RunnerConfig};
pub use controller::{ModelController, RunnerError};
pub use dispatch::{run_model, run_model_with, ModelData, RETURNS_MISSING};
pub use store::{SharedVariableStore, StoreError};

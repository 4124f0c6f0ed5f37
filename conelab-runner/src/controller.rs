//! Model lifecycle controller.
//!
//! One controller owns one model variant. The first `run` creates the shared
//! variable store and builds the spec; later runs rebind the store and reuse
//! the spec as long as the input names and ranks are unchanged. Each run
//! draws from its own seed derived from the master seed and the run counter.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::ArrayD;
use thiserror::Error;

use conelab_core::domain::TraceError;
use conelab_core::rng::RngHierarchy;
use conelab_core::{
    infer, InferenceConfig, InferenceError, ModelError, ModelKind, ModelSpec, PosteriorTrace,
    SeriesError,
};

use crate::best_summary::SummaryError;
use crate::cone::ConeError;
use crate::config::{ConfigError, DEFAULT_SEED};
use crate::profiling::{profile, ProfileScope};
use crate::store::{SharedVariableStore, StoreError};

/// Errors surfaced at the runner boundary.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("model configuration: {0}")]
    Model(#[from] ModelError),
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("cone: {0}")]
    Cone(#[from] ConeError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("series: {0}")]
    Series(#[from] SeriesError),
    #[error("trace: {0}")]
    Trace(#[from] TraceError),
    #[error("summary: {0}")]
    Summary(#[from] SummaryError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("{0} series is empty")]
    EmptySeries(&'static str),
    #[error("model '{model}' requires the {series} series")]
    MissingSeries { model: ModelKind, series: &'static str },
    #[error("benchmark lacks {} training dates", dates.len())]
    BenchmarkGap { dates: Vec<NaiveDate> },
}

/// Compiled state reused across runs.
#[derive(Debug)]
struct Built {
    spec: ModelSpec,
    store: SharedVariableStore,
    key: Vec<(String, usize)>,
}

#[derive(Debug)]
pub struct ModelController {
    kind: ModelKind,
    config: InferenceConfig,
    seeds: RngHierarchy,
    built: Option<Built>,
    builds: usize,
    runs: u64,
}

impl ModelController {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            config: InferenceConfig::default(),
            seeds: RngHierarchy::new(DEFAULT_SEED),
            built: None,
            builds: 0,
            runs: 0,
        }
    }

    pub fn with_config(mut self, config: InferenceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.config.samples = samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeds = RngHierarchy::new(seed);
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Number of times the spec has been built.
    pub fn build_count(&self) -> usize {
        self.builds
    }

    pub fn run_count(&self) -> u64 {
        self.runs
    }

    /// The cached spec, once built.
    pub fn spec(&self) -> Option<&ModelSpec> {
        self.built.as_ref().map(|b| &b.spec)
    }

    /// Drop the cached spec and store; the next run builds afresh.
    pub fn rebuild(&mut self) {
        self.built = None;
    }

    /// Bind `inputs` and draw posterior samples.
    ///
    /// Input names are checked against the variant before anything is built.
    /// Array shapes are not; a wrong rank fails inside inference.
    pub fn run(
        &mut self,
        inputs: BTreeMap<String, ArrayD<f64>>,
    ) -> Result<PosteriorTrace, RunnerError> {
        self.kind.validate_inputs(inputs.keys().map(String::as_str))?;
        let key: Vec<(String, usize)> = inputs
            .iter()
            .map(|(name, a)| (name.clone(), a.ndim()))
            .collect();

        let built = match self.built.take() {
            Some(mut built) if built.key == key => {
                built.store.rebind_all(&inputs)?;
                built
            }
            _ => {
                let kind = self.kind;
                let (spec, elapsed) = profile("controller.build", || kind.build());
                self.builds += 1;
                tracing::debug!(
                    model = %kind,
                    builds = self.builds,
                    elapsed_us = elapsed.as_micros() as u64,
                    "model built"
                );
                Built {
                    spec,
                    store: SharedVariableStore::create(&inputs),
                    key,
                }
            }
        };
        let built = self.built.insert(built);

        let run = self.runs;
        self.runs += 1;
        let mut rng = self.seeds.rng_for(self.kind.name(), run);
        let _scope = ProfileScope::new("controller.run");
        let trace = infer(&built.spec, built.store.bindings(), &self.config, &mut rng)?;
        tracing::info!(
            model = %self.kind,
            run,
            samples = trace.len(),
            divergences = trace.stats().divergences,
            "inference complete"
        );
        Ok(trace)
    }
}

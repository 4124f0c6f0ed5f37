//! Inference engine: Powell MAP start, curvature-scaled NUTS, trace assembly.
//!
//! `infer` binds a spec to data, finds the posterior mode in unconstrained
//! space, scales the sampler by the curvature there, and returns the retained
//! draws together with deterministic quantities and one simulated value per
//! missing observation per draw.

pub mod curvature;
pub mod nuts;
pub mod posterior;
pub mod powell;

use std::collections::BTreeMap;

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{LatentBlock, PosteriorTrace, SamplerStats, TraceError, MISSING_SUFFIX};
use crate::model::ModelSpec;
use crate::DataBindings;

pub use posterior::BoundModel;
pub use powell::PowellConfig;

/// A differentiable log density over unconstrained coordinates.
pub trait LogDensity {
    fn dim(&self) -> usize;

    /// Log density at `z`, writing its gradient into `grad`.
    fn log_density_grad(&self, z: &[f64], grad: &mut [f64]) -> f64;

    fn log_density(&self, z: &[f64]) -> f64 {
        let mut grad = vec![0.0; self.dim()];
        self.log_density_grad(z, &mut grad)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("input '{0}' is not bound")]
    Unbound(String),
    #[error("shape mismatch for '{name}': {detail}")]
    ShapeMismatch { name: String, detail: String },
    #[error("cannot resolve parameter '{param}': data statistic undefined or prior invalid")]
    Degenerate { param: String },
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Sampler and optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Retained posterior draws.
    pub samples: usize,
    /// Adaptation transitions discarded before retention.
    pub warmup: usize,
    pub max_tree_depth: usize,
    pub target_accept: f64,
    pub powell: PowellConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            samples: 2000,
            warmup: 500,
            max_tree_depth: 10,
            target_accept: 0.8,
            powell: PowellConfig::default(),
        }
    }
}

impl InferenceConfig {
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }
}

/// Draw `config.samples` posterior draws for `spec` bound to `data`.
pub fn infer<R: Rng + ?Sized>(
    spec: &ModelSpec,
    data: &DataBindings,
    config: &InferenceConfig,
    rng: &mut R,
) -> Result<PosteriorTrace, InferenceError> {
    let span = tracing::debug_span!("infer", model = %spec.kind());
    let _enter = span.enter();

    let model = BoundModel::bind(spec, data)?;
    let z0 = model.start_unconstrained()?;
    if !model.log_density(&z0).is_finite() {
        return Err(InferenceError::NumericalInstability(
            "log density is not finite at the start values".to_string(),
        ));
    }

    let map = powell::minimize(|z| -model.log_density(z), &z0, &config.powell)
        .map_err(|e| InferenceError::NumericalInstability(e.to_string()))?;
    if !map.converged || !map.fun.is_finite() {
        return Err(InferenceError::NumericalInstability(format!(
            "MAP search did not converge after {} iterations ({} evaluations, objective {})",
            map.iterations, map.evaluations, map.fun
        )));
    }
    let theta_map = model.constrain(&map.x);
    tracing::debug!(
        iterations = map.iterations,
        evaluations = map.evaluations,
        log_density = -map.fun,
        "MAP found"
    );

    let inv_mass = curvature::inverse_mass_diag(&model, &map.x);
    let settings = nuts::NutsSettings {
        warmup: config.warmup,
        samples: config.samples,
        max_tree_depth: config.max_tree_depth,
        target_accept: config.target_accept,
    };
    let run = nuts::sample(&model, &map.x, &inv_mass, &settings, rng)?;
    if run.divergences > 0 {
        tracing::warn!(
            divergences = run.divergences,
            samples = config.samples,
            "divergent transitions after warmup"
        );
    }
    if config.samples > 0 && run.divergences == config.samples {
        return Err(InferenceError::NumericalInstability(
            "every retained transition diverged".to_string(),
        ));
    }

    let n_params = spec.params().len();
    let n_derived = spec.derived().len();
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(run.draws.len()); n_params + n_derived];
    let latent_terms: Vec<(String, Vec<usize>)> = model
        .latent_terms()
        .map(|(name, pos)| (name.to_string(), pos.to_vec()))
        .collect();
    let mut latent: Vec<Array2<f64>> = latent_terms
        .iter()
        .map(|(_, pos)| Array2::zeros((run.draws.len(), pos.len())))
        .collect();

    for (row, z) in run.draws.iter().enumerate() {
        let theta = model.constrain(z);
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::NumericalInstability(format!(
                "non-finite parameter value in draw {row}"
            )));
        }
        for (col, v) in columns.iter_mut().zip(theta.iter().chain(&model.derived(&theta))) {
            col.push(*v);
        }
        for (block, sims) in latent.iter_mut().zip(model.simulate_missing(&theta, rng)) {
            for (j, v) in sims.into_iter().enumerate() {
                block[[row, j]] = v;
            }
        }
    }

    let names = spec
        .param_names()
        .chain(spec.derived_names())
        .map(str::to_string);
    let blocks: BTreeMap<String, LatentBlock> = latent_terms
        .into_iter()
        .zip(latent)
        .map(|((name, positions), draws)| {
            (
                format!("{name}{MISSING_SUFFIX}"),
                LatentBlock {
                    positions,
                    index: None,
                    draws,
                },
            )
        })
        .collect();
    let stats = SamplerStats {
        step_size: run.step_size,
        divergences: run.divergences,
        mean_accept: run.mean_accept,
        mean_tree_depth: run.mean_tree_depth,
        warmup: config.warmup,
        map_point: spec
            .param_names()
            .map(str::to_string)
            .zip(theta_map)
            .collect(),
    };
    tracing::debug!(
        samples = run.draws.len(),
        step_size = run.step_size,
        mean_accept = run.mean_accept,
        "sampling complete"
    );
    let n = run.draws.len();
    Ok(PosteriorTrace::new(n, names.zip(columns).collect(), blocks, stats)?)
}

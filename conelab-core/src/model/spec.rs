//! ModelSpec: an immutable generative model description.
//!
//! A spec is assembled with [`ModelBuilder`] from four kinds of declarations:
//! - data slots (named handles the caller binds arrays to),
//! - free parameters (prior family + start value),
//! - observed likelihood terms over a data slot,
//! - named deterministic quantities computed from the parameters.
//!
//! Prior hyperparameters and start values are [`Value`]s: either constants or
//! statistics of a bound slot. They are resolved against the current bindings
//! at every inference run, so a cached spec follows rebound data the same way
//! a symbolic graph over shared variables would.

use std::fmt;
use std::sync::Arc;

use crate::distributions::Prior;
use crate::model::ModelKind;
use crate::stats;

/// Index of a data slot within a spec.
pub type SlotId = usize;
/// Index of a free parameter within a spec.
pub type ParamId = usize;

/// Statistic of bound data, computed over non-missing entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Statistic {
    Mean(SlotId),
    Std(SlotId),
    /// Mean of the concatenation of several slots.
    PooledMean(Vec<SlotId>),
    /// Population std of the concatenation of several slots.
    PooledStd(Vec<SlotId>),
    /// OLS intercept of `y` regressed on `x`.
    OlsIntercept { y: SlotId, x: SlotId },
    /// OLS slope of `y` regressed on `x`.
    OlsSlope { y: SlotId, x: SlotId },
}

impl Statistic {
    /// Evaluate against slot vectors (indexed by `SlotId`).
    ///
    /// `None` when the statistic is undefined for the data (too few points,
    /// no variance in the regressor).
    pub fn evaluate(&self, slots: &[Vec<f64>]) -> Option<f64> {
        let value = match self {
            Statistic::Mean(s) => stats::mean_observed(&slots[*s]),
            Statistic::Std(s) => stats::std_observed(&slots[*s]),
            Statistic::PooledMean(ids) => stats::mean(&pooled(slots, ids)),
            Statistic::PooledStd(ids) => stats::std(&pooled(slots, ids)),
            Statistic::OlsIntercept { y, x } => stats::linregress(&slots[*x], &slots[*y])?.1,
            Statistic::OlsSlope { y, x } => stats::linregress(&slots[*x], &slots[*y])?.0,
        };
        value.is_finite().then_some(value)
    }
}

fn pooled(slots: &[Vec<f64>], ids: &[SlotId]) -> Vec<f64> {
    ids.iter()
        .flat_map(|s| stats::observed(&slots[*s]))
        .collect()
}

/// A hyperparameter or start value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Const(f64),
    /// `scale * statistic`.
    Stat { stat: Statistic, scale: f64 },
}

impl Value {
    pub fn stat(stat: Statistic) -> Self {
        Value::Stat { stat, scale: 1.0 }
    }

    pub fn scaled(stat: Statistic, scale: f64) -> Self {
        Value::Stat { stat, scale }
    }

    pub fn resolve(&self, slots: &[Vec<f64>]) -> Option<f64> {
        match self {
            Value::Const(v) => Some(*v),
            Value::Stat { stat, scale } => stat.evaluate(slots).map(|v| v * scale),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Const(v)
    }
}

/// Prior family with possibly data-dependent hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorSpec {
    Normal { mu: Value, sigma: Value },
    HalfCauchy { beta: Value },
    Exponential { rate: Value },
    Uniform { lower: Value, upper: Value },
}

impl PriorSpec {
    pub fn resolve(&self, slots: &[Vec<f64>]) -> Option<Prior> {
        let prior = match self {
            PriorSpec::Normal { mu, sigma } => Prior::Normal {
                mu: mu.resolve(slots)?,
                sigma: sigma.resolve(slots)?,
            },
            PriorSpec::HalfCauchy { beta } => Prior::HalfCauchy {
                beta: beta.resolve(slots)?,
            },
            PriorSpec::Exponential { rate } => Prior::Exponential {
                rate: rate.resolve(slots)?,
            },
            PriorSpec::Uniform { lower, upper } => Prior::Uniform {
                lower: lower.resolve(slots)?,
                upper: upper.resolve(slots)?,
            },
        };
        Some(prior)
    }
}

/// A parameter reference shifted by a constant: `param + offset`.
///
/// Used for degrees of freedom, e.g. `nu = nu_minus_two + 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shifted {
    pub param: ParamId,
    pub offset: f64,
}

/// Location of an observed term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    Param(ParamId),
    /// `intercept + slope * covariate[i]`.
    Linear {
        intercept: ParamId,
        slope: ParamId,
        covariate: SlotId,
    },
}

/// Likelihood family of an observed term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Likelihood {
    Normal { mu: Location, sigma: ParamId },
    StudentT {
        nu: Shifted,
        mu: Location,
        sigma: ParamId,
    },
}

/// Deterministic quantity: a function of the constrained parameter vector.
pub type DerivedFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub prior: PriorSpec,
    pub start: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedDecl {
    pub name: String,
    pub slot: SlotId,
    pub likelihood: Likelihood,
}

#[derive(Clone)]
pub struct DerivedDecl {
    pub name: String,
    pub expr: DerivedFn,
}

impl fmt::Debug for DerivedDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedDecl").field("name", &self.name).finish()
    }
}

/// Fully specified generative model. Immutable once built.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    kind: ModelKind,
    slots: Vec<String>,
    params: Vec<ParamDecl>,
    observed: Vec<ObservedDecl>,
    derived: Vec<DerivedDecl>,
}

impl ModelSpec {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Data slot names, indexed by `SlotId`.
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    pub fn observed(&self) -> &[ObservedDecl] {
        &self.observed
    }

    pub fn derived(&self) -> &[DerivedDecl] {
        &self.derived
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn derived_names(&self) -> impl Iterator<Item = &str> {
        self.derived.iter().map(|d| d.name.as_str())
    }

    pub fn param_id(&self, name: &str) -> Option<ParamId> {
        self.params.iter().position(|p| p.name == name)
    }
}

/// Collects declarations into a [`ModelSpec`].
#[derive(Debug)]
pub struct ModelBuilder {
    kind: ModelKind,
    slots: Vec<String>,
    params: Vec<ParamDecl>,
    observed: Vec<ObservedDecl>,
    derived: Vec<DerivedDecl>,
}

impl ModelBuilder {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            params: Vec::new(),
            observed: Vec::new(),
            derived: Vec::new(),
        }
    }

    /// Declare a 1-D data slot.
    pub fn data(&mut self, name: &str) -> SlotId {
        self.slots.push(name.to_string());
        self.slots.len() - 1
    }

    /// Declare a free parameter.
    pub fn param(&mut self, name: &str, prior: PriorSpec, start: impl Into<Value>) -> ParamId {
        self.params.push(ParamDecl {
            name: name.to_string(),
            prior,
            start: start.into(),
        });
        self.params.len() - 1
    }

    /// Declare an observed term over `slot`. NaN entries of the bound array
    /// become latent and are simulated with every posterior draw.
    pub fn observe(&mut self, name: &str, slot: SlotId, likelihood: Likelihood) {
        self.observed.push(ObservedDecl {
            name: name.to_string(),
            slot,
            likelihood,
        });
    }

    /// Declare a named deterministic quantity.
    pub fn deterministic<F>(&mut self, name: &str, expr: F)
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.derived.push(DerivedDecl {
            name: name.to_string(),
            expr: Arc::new(expr),
        });
    }

    pub fn build(self) -> ModelSpec {
        ModelSpec {
            kind: self.kind,
            slots: self.slots,
            params: self.params,
            observed: self.observed,
            derived: self.derived,
        }
    }
}

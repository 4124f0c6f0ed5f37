//! A model spec resolved against concrete data bindings.
//!
//! Binding checks slot ranks, evaluates data-dependent hyperparameters and
//! start values, and splits every observed slot into observed entries (which
//! enter the likelihood) and missing entries (which are simulated per draw).
//! The resulting [`BoundModel`] is the log density the optimizer and sampler
//! work on, in unconstrained coordinates.

use rand::Rng;

use super::{InferenceError, LogDensity};
use crate::distributions::{
    normal_lpdf_grad, sample_normal, sample_student_t, Prior, StudentTTerms,
};
use crate::model::{Likelihood, Location, ModelSpec};
use crate::stats;
use crate::transform::Support;
use crate::DataBindings;

#[derive(Debug, Clone)]
struct BoundTerm {
    name: String,
    likelihood: Likelihood,
    /// Observed values.
    y: Vec<f64>,
    /// Covariate at the observed positions (zeros when the location has none).
    x: Vec<f64>,
    /// Positions of the missing entries within the slot.
    missing: Vec<usize>,
    /// Covariate at the missing positions.
    x_missing: Vec<f64>,
}

/// Resolved model: priors, supports, start point and split data.
#[derive(Debug, Clone)]
pub struct BoundModel<'a> {
    spec: &'a ModelSpec,
    priors: Vec<Prior>,
    supports: Vec<Support>,
    start: Vec<f64>,
    terms: Vec<BoundTerm>,
}

fn location(loc: &Location, theta: &[f64], x: f64) -> f64 {
    match *loc {
        Location::Param(p) => theta[p],
        Location::Linear {
            intercept, slope, ..
        } => theta[intercept] + theta[slope] * x,
    }
}

fn push_location_grad(loc: &Location, grad: &mut [f64], d_mu: f64, x: f64) {
    match *loc {
        Location::Param(p) => grad[p] += d_mu,
        Location::Linear {
            intercept, slope, ..
        } => {
            grad[intercept] += d_mu;
            grad[slope] += d_mu * x;
        }
    }
}

/// Relative spread below which observed data count as constant.
const CONSTANT_SPREAD: f64 = 1e-12;

/// All values equal up to rounding; the population std of such data is
/// numerical noise rather than zero.
fn is_constant(values: &[f64]) -> bool {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    !values.is_empty() && hi - lo <= CONSTANT_SPREAD * stats::mean(values).abs().max(1.0)
}

impl<'a> BoundModel<'a> {
    /// Resolve `spec` against `bindings`.
    pub fn bind(spec: &'a ModelSpec, bindings: &DataBindings) -> Result<Self, InferenceError> {
        let mut slots = Vec::with_capacity(spec.slots().len());
        for name in spec.slots() {
            let array = bindings
                .get(name)
                .ok_or_else(|| InferenceError::Unbound(name.clone()))?;
            if array.ndim() != 1 {
                return Err(InferenceError::ShapeMismatch {
                    name: name.clone(),
                    detail: format!("expected a 1-D array, got shape {:?}", array.shape()),
                });
            }
            slots.push(array.iter().copied().collect::<Vec<f64>>());
        }

        let mut terms = Vec::with_capacity(spec.observed().len());
        for decl in spec.observed() {
            let values = &slots[decl.slot];
            let covariate = match decl.likelihood {
                Likelihood::Normal { mu, .. } | Likelihood::StudentT { mu, .. } => match mu {
                    Location::Linear { covariate, .. } => Some(covariate),
                    Location::Param(_) => None,
                },
            };
            let xs = match covariate {
                Some(c) => {
                    let xs = &slots[c];
                    if xs.len() != values.len() {
                        return Err(InferenceError::ShapeMismatch {
                            name: spec.slots()[c].clone(),
                            detail: format!(
                                "length {} does not match '{}' length {}",
                                xs.len(),
                                spec.slots()[decl.slot],
                                values.len()
                            ),
                        });
                    }
                    if xs.iter().any(|v| !v.is_finite()) {
                        return Err(InferenceError::ShapeMismatch {
                            name: spec.slots()[c].clone(),
                            detail: "covariate has missing entries".to_string(),
                        });
                    }
                    xs.clone()
                }
                None => vec![0.0; values.len()],
            };

            let mut term = BoundTerm {
                name: decl.name.clone(),
                likelihood: decl.likelihood,
                y: Vec::new(),
                x: Vec::new(),
                missing: Vec::new(),
                x_missing: Vec::new(),
            };
            for (i, (&v, &x)) in values.iter().zip(xs.iter()).enumerate() {
                if v.is_nan() {
                    term.missing.push(i);
                    term.x_missing.push(x);
                } else {
                    term.y.push(v);
                    term.x.push(x);
                }
            }
            if is_constant(&term.y) {
                return Err(InferenceError::NumericalInstability(format!(
                    "observed term '{}' is constant; its scale cannot be estimated",
                    term.name
                )));
            }
            terms.push(term);
        }

        let mut priors = Vec::with_capacity(spec.params().len());
        let mut start = Vec::with_capacity(spec.params().len());
        for decl in spec.params() {
            let prior = decl
                .prior
                .resolve(&slots)
                .filter(Prior::is_valid)
                .ok_or_else(|| InferenceError::Degenerate {
                    param: decl.name.clone(),
                })?;
            let value = decl
                .start
                .resolve(&slots)
                .ok_or_else(|| InferenceError::Degenerate {
                    param: decl.name.clone(),
                })?;
            priors.push(prior);
            start.push(value);
        }
        let supports = priors.iter().map(Prior::support).collect();

        Ok(Self {
            spec,
            priors,
            supports,
            start,
            terms,
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        self.spec
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    /// Start point in unconstrained space.
    pub fn start_unconstrained(&self) -> Result<Vec<f64>, InferenceError> {
        let mut z = Vec::with_capacity(self.start.len());
        for ((theta, support), decl) in self
            .start
            .iter()
            .zip(self.supports.iter())
            .zip(self.spec.params())
        {
            let v = support.to_unconstrained(*theta);
            if !v.is_finite() {
                return Err(InferenceError::NumericalInstability(format!(
                    "start value {theta} for '{}' is outside its support",
                    decl.name
                )));
            }
            z.push(v);
        }
        Ok(z)
    }

    pub fn constrain(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .zip(self.supports.iter())
            .map(|(&z, s)| s.to_constrained(z))
            .collect()
    }

    /// Deterministic quantities at constrained parameters `theta`.
    pub fn derived(&self, theta: &[f64]) -> Vec<f64> {
        self.spec.derived().iter().map(|d| (d.expr)(theta)).collect()
    }

    /// Observed terms that have missing entries: `(name, positions)`.
    pub fn latent_terms(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.terms
            .iter()
            .filter(|t| !t.missing.is_empty())
            .map(|t| (t.name.as_str(), t.missing.as_slice()))
    }

    /// One simulated value per missing entry, for each term with missing
    /// entries (in `latent_terms` order).
    ///
    /// Missing entries have no children in the model, so their conditional
    /// posterior given the parameters is the likelihood itself.
    pub fn simulate_missing<R: Rng + ?Sized>(&self, theta: &[f64], rng: &mut R) -> Vec<Vec<f64>> {
        self.terms
            .iter()
            .filter(|t| !t.missing.is_empty())
            .map(|term| {
                term.x_missing
                    .iter()
                    .map(|&x| match term.likelihood {
                        Likelihood::Normal { mu, sigma } => {
                            sample_normal(rng, location(&mu, theta, x), theta[sigma])
                        }
                        Likelihood::StudentT { nu, mu, sigma } => sample_student_t(
                            rng,
                            theta[nu.param] + nu.offset,
                            location(&mu, theta, x),
                            theta[sigma],
                        ),
                    })
                    .collect()
            })
            .collect()
    }

    fn term_log_likelihood(&self, term: &BoundTerm, theta: &[f64], grad: &mut [f64]) -> f64 {
        let mut lp = 0.0;
        match term.likelihood {
            Likelihood::Normal { mu, sigma } => {
                let s = theta[sigma];
                if s.is_nan() || s <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                for (&y, &x) in term.y.iter().zip(term.x.iter()) {
                    let (l, g) = normal_lpdf_grad(y, location(&mu, theta, x), s);
                    lp += l;
                    grad[sigma] += g.d_sigma;
                    push_location_grad(&mu, grad, g.d_mu, x);
                }
            }
            Likelihood::StudentT { nu, mu, sigma } => {
                let s = theta[sigma];
                let df = theta[nu.param] + nu.offset;
                if s.is_nan() || s <= 0.0 || df.is_nan() || df <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                let t = StudentTTerms::new(df);
                for (&y, &x) in term.y.iter().zip(term.x.iter()) {
                    let (l, g) = t.lpdf_grad(y, location(&mu, theta, x), s);
                    lp += l;
                    grad[sigma] += g.d_sigma;
                    grad[nu.param] += g.d_nu;
                    push_location_grad(&mu, grad, g.d_mu, x);
                }
            }
        }
        lp
    }
}

impl LogDensity for BoundModel<'_> {
    fn dim(&self) -> usize {
        self.priors.len()
    }

    fn log_density_grad(&self, z: &[f64], grad: &mut [f64]) -> f64 {
        let theta = self.constrain(z);
        let mut g_theta = vec![0.0; theta.len()];
        grad.iter_mut().for_each(|g| *g = 0.0);

        let mut lp = 0.0;
        for (i, prior) in self.priors.iter().enumerate() {
            let (l, g) = prior.lpdf_grad(theta[i]);
            lp += l;
            g_theta[i] += g;
        }
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        for term in &self.terms {
            lp += self.term_log_likelihood(term, &theta, &mut g_theta);
        }
        for (i, support) in self.supports.iter().enumerate() {
            let (lj, dlj) = support.log_jacobian_grad(z[i]);
            lp += lj;
            grad[i] = g_theta[i] * support.dtheta_dz(z[i]) + dlj;
        }
        if lp.is_nan() {
            f64::NEG_INFINITY
        } else {
            lp
        }
    }
}

//! Log densities, their partial derivatives, and random draws for the
//! distribution families used by the return models.
//!
//! Every `*_lpdf_grad` function returns the log density together with the
//! partial derivatives the sampler needs. Densities are evaluated in the
//! parameter's constrained space; support transforms live in `transform`.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::{digamma, ln_gamma};

use crate::transform::Support;

const LN_2PI: f64 = 1.837_877_066_409_345_5;
const LN_PI: f64 = 1.144_729_885_849_400_2;

/// Partial derivatives of a location-scale log density with respect to its
/// parameters. `d_nu` is zero for families without a shape parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocScaleGrad {
    pub d_mu: f64,
    pub d_sigma: f64,
    pub d_nu: f64,
}

// ─── Normal ──────────────────────────────────────────────────────────

pub fn normal_lpdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    -0.5 * LN_2PI - sigma.ln() - 0.5 * z * z
}

pub fn normal_lpdf_grad(x: f64, mu: f64, sigma: f64) -> (f64, LocScaleGrad) {
    let r = x - mu;
    let s2 = sigma * sigma;
    let grad = LocScaleGrad {
        d_mu: r / s2,
        d_sigma: -1.0 / sigma + r * r / (s2 * sigma),
        d_nu: 0.0,
    };
    (normal_lpdf(x, mu, sigma), grad)
}

// ─── Student-T ───────────────────────────────────────────────────────

/// Terms of the Student-T log density that depend only on `nu`.
///
/// Hoisted out of the per-observation loop.
#[derive(Debug, Clone, Copy)]
pub struct StudentTTerms {
    nu: f64,
    log_norm: f64,
    d_log_norm: f64,
}

impl StudentTTerms {
    pub fn new(nu: f64) -> Self {
        let half = 0.5 * (nu + 1.0);
        Self {
            nu,
            log_norm: ln_gamma(half) - ln_gamma(0.5 * nu) - 0.5 * (nu.ln() + LN_PI),
            d_log_norm: 0.5 * digamma(half) - 0.5 * digamma(0.5 * nu) - 0.5 / nu,
        }
    }

    pub fn lpdf(&self, x: f64, mu: f64, sigma: f64) -> f64 {
        let z = (x - mu) / sigma;
        self.log_norm - sigma.ln() - 0.5 * (self.nu + 1.0) * (z * z / self.nu).ln_1p()
    }

    pub fn lpdf_grad(&self, x: f64, mu: f64, sigma: f64) -> (f64, LocScaleGrad) {
        let nu = self.nu;
        let z = (x - mu) / sigma;
        let z2 = z * z;
        let denom = nu + z2;
        let grad = LocScaleGrad {
            d_mu: (nu + 1.0) * z / (sigma * denom),
            d_sigma: -1.0 / sigma + (nu + 1.0) * z2 / (sigma * denom),
            d_nu: self.d_log_norm - 0.5 * (z2 / nu).ln_1p() + (nu + 1.0) * z2 / (2.0 * nu * denom),
        };
        (self.lpdf(x, mu, sigma), grad)
    }
}

pub fn student_t_lpdf(x: f64, nu: f64, mu: f64, sigma: f64) -> f64 {
    StudentTTerms::new(nu).lpdf(x, mu, sigma)
}

/// Variance of a Student-T with scale `sigma`; infinite for `nu <= 2`.
pub fn student_t_variance(nu: f64, sigma: f64) -> f64 {
    if nu <= 2.0 {
        f64::INFINITY
    } else {
        sigma * sigma * nu / (nu - 2.0)
    }
}

// ─── Priors ──────────────────────────────────────────────────────────

/// A prior family with concrete hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Prior {
    Normal { mu: f64, sigma: f64 },
    HalfCauchy { beta: f64 },
    Exponential { rate: f64 },
    Uniform { lower: f64, upper: f64 },
}

impl Prior {
    /// Support of the family, which selects the unconstrained transform.
    pub fn support(&self) -> Support {
        match *self {
            Prior::Normal { .. } => Support::Real,
            Prior::HalfCauchy { .. } | Prior::Exponential { .. } => Support::Positive,
            Prior::Uniform { lower, upper } => Support::Interval { lower, upper },
        }
    }

    /// Hyperparameters are finite and scales strictly positive.
    pub fn is_valid(&self) -> bool {
        match *self {
            Prior::Normal { mu, sigma } => mu.is_finite() && sigma.is_finite() && sigma > 0.0,
            Prior::HalfCauchy { beta } => beta.is_finite() && beta > 0.0,
            Prior::Exponential { rate } => rate.is_finite() && rate > 0.0,
            Prior::Uniform { lower, upper } => {
                lower.is_finite() && upper.is_finite() && upper > lower
            }
        }
    }

    /// Log density at `x` and its derivative with respect to `x`.
    pub fn lpdf_grad(&self, x: f64) -> (f64, f64) {
        match *self {
            Prior::Normal { mu, sigma } => {
                let (lp, g) = normal_lpdf_grad(x, mu, sigma);
                (lp, -g.d_mu)
            }
            Prior::HalfCauchy { beta } => {
                if x < 0.0 {
                    return (f64::NEG_INFINITY, 0.0);
                }
                let lp = std::f64::consts::LN_2 - LN_PI - beta.ln() - (x / beta).powi(2).ln_1p();
                (lp, -2.0 * x / (beta * beta + x * x))
            }
            Prior::Exponential { rate } => {
                if x < 0.0 {
                    return (f64::NEG_INFINITY, 0.0);
                }
                (rate.ln() - rate * x, -rate)
            }
            Prior::Uniform { lower, upper } => {
                if x < lower || x > upper {
                    return (f64::NEG_INFINITY, 0.0);
                }
                (-(upper - lower).ln(), 0.0)
            }
        }
    }
}

// ─── Draws ───────────────────────────────────────────────────────────

pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R, mu: f64, sigma: f64) -> f64 {
    let z: f64 = StandardNormal.sample(rng);
    mu + sigma * z
}

/// Student-T draw: a standard `rand_distr::StudentT(nu)` variate scaled by
/// `sigma` and shifted by `mu`. NaN when `nu` is not a valid degree of freedom.
pub fn sample_student_t<R: Rng + ?Sized>(rng: &mut R, nu: f64, mu: f64, sigma: f64) -> f64 {
    match rand_distr::StudentT::new(nu) {
        Ok(t) => mu + sigma * t.sample(rng),
        Err(_) => f64::NAN,
    }
}

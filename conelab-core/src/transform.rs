//! Support transforms between constrained parameters and the unconstrained
//! space the optimizer and sampler work in.
//!
//! - `Real`: identity.
//! - `Positive`: `theta = exp(z)`.
//! - `Interval { lower, upper }`: `theta = lower + (upper - lower) * logistic(z)`.
//!
//! Densities over `z` include the log-Jacobian `ln |d theta / d z|`; the
//! sampler needs its derivative as well.

use serde::{Deserialize, Serialize};

/// Cutoff beyond which the logistic saturates in `f64`.
const LOGISTIC_CUTOFF: f64 = 36.0;

/// Support of a free parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Support {
    Real,
    Positive,
    Interval { lower: f64, upper: f64 },
}

/// Numerically guarded logistic function.
fn logistic(z: f64) -> f64 {
    if z > LOGISTIC_CUTOFF {
        1.0
    } else if z < -LOGISTIC_CUTOFF {
        z.exp()
    } else {
        1.0 / (1.0 + (-z).exp())
    }
}

impl Support {
    /// Map an unconstrained value into the support.
    pub fn to_constrained(&self, z: f64) -> f64 {
        match *self {
            Support::Real => z,
            Support::Positive => z.exp(),
            Support::Interval { lower, upper } => lower + (upper - lower) * logistic(z),
        }
    }

    /// Map a constrained value to unconstrained space.
    ///
    /// Values on or outside the boundary map to infinities.
    pub fn to_unconstrained(&self, theta: f64) -> f64 {
        match *self {
            Support::Real => theta,
            Support::Positive => theta.ln(),
            Support::Interval { lower, upper } => {
                let u = (theta - lower) / (upper - lower);
                (u / (1.0 - u)).ln()
            }
        }
    }

    /// `d theta / d z` at `z`.
    pub fn dtheta_dz(&self, z: f64) -> f64 {
        match *self {
            Support::Real => 1.0,
            Support::Positive => z.exp(),
            Support::Interval { lower, upper } => {
                let s = logistic(z);
                (upper - lower) * s * (1.0 - s)
            }
        }
    }

    /// `ln |d theta / d z|` and its derivative with respect to `z`.
    pub fn log_jacobian_grad(&self, z: f64) -> (f64, f64) {
        match *self {
            Support::Real => (0.0, 0.0),
            Support::Positive => (z, 1.0),
            Support::Interval { lower, upper } => {
                let s = logistic(z);
                // ln s + ln(1 - s) = -softplus(-z) - softplus(z)
                let log_jac = (upper - lower).ln() - softplus(-z) - softplus(z);
                (log_jac, 1.0 - 2.0 * s)
            }
        }
    }
}

/// Stable `ln(1 + exp(x))`.
fn softplus(x: f64) -> f64 {
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

//! Powell's conjugate-direction method.
//!
//! Derivative-free minimization: cycle line searches along a direction set,
//! replacing the direction of largest decrease with the net displacement of
//! each sweep when that direction is still promising. Line searches bracket
//! the minimum by golden-section expansion and refine it with `argmin`'s
//! Brent minimizer on the bracketed interval.

use std::cell::RefCell;

use argmin::core::{CostFunction, Executor, State};
use argmin::solver::brent::BrentOpt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GOLD: f64 = 1.618_034;
const TINY: f64 = 1e-21;
const GROW_LIMIT: f64 = 110.0;
const BRACKET_MAX_ITER: usize = 1000;
const BRENT_MAX_ITER: u64 = 500;
/// Absolute floor of the line-search tolerance.
const BRENT_ABS_TOL: f64 = 1e-11;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowellError {
    #[error("line search failed: {0}")]
    LineSearch(String),
}

/// Tolerances and budgets for [`minimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowellConfig {
    /// Line-search tolerance on the step length.
    pub xtol: f64,
    /// Relative tolerance on the objective between sweeps.
    pub ftol: f64,
    /// Maximum number of sweeps.
    pub max_iter: usize,
    /// Maximum number of objective evaluations.
    pub max_evals: usize,
}

impl Default for PowellConfig {
    fn default() -> Self {
        Self {
            xtol: 1e-4,
            ftol: 1e-4,
            max_iter: 5_000,
            max_evals: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowellResult {
    pub x: Vec<f64>,
    pub fun: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// The relative decrease criterion was met within the budgets.
    pub converged: bool,
}

/// Objective wrapper that counts evaluations and maps NaN to `+inf`.
struct Counted<F> {
    f: F,
    evals: usize,
}

impl<F: FnMut(&[f64]) -> f64> Counted<F> {
    fn eval(&mut self, x: &[f64]) -> f64 {
        self.evals += 1;
        let v = (self.f)(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    }
}

/// Minimize `f` starting from `x0`.
pub fn minimize<F>(f: F, x0: &[f64], config: &PowellConfig) -> Result<PowellResult, PowellError>
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut obj = Counted { f, evals: 0 };
    let mut x = x0.to_vec();
    let mut fval = obj.eval(&x);
    let mut directions: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut d = vec![0.0; n];
            d[i] = 1.0;
            d
        })
        .collect();
    let mut x_prev = x.clone();
    let mut iterations = 0;
    let mut converged = false;

    while n > 0 {
        let fx = fval;
        let mut biggest = 0;
        let mut delta = 0.0;
        for (i, dir) in directions.iter().enumerate() {
            let before = fval;
            let (f_new, x_new, _) = line_search(&mut obj, &x, dir, config.xtol * 100.0)?;
            fval = f_new;
            x = x_new;
            if before - fval > delta {
                delta = before - fval;
                biggest = i;
            }
        }
        iterations += 1;

        if 2.0 * (fx - fval) <= config.ftol * (fx.abs() + fval.abs()) + 1e-20 {
            converged = fval.is_finite();
            break;
        }
        if obj.evals >= config.max_evals || iterations >= config.max_iter {
            break;
        }

        // Extrapolate along the net displacement of this sweep.
        let displacement: Vec<f64> = x.iter().zip(&x_prev).map(|(a, b)| a - b).collect();
        let extrapolated: Vec<f64> = x.iter().zip(&x_prev).map(|(a, b)| 2.0 * a - b).collect();
        x_prev.clone_from(&x);
        let fx2 = obj.eval(&extrapolated);
        if fx > fx2 {
            let mut t = 2.0 * (fx + fx2 - 2.0 * fval);
            let temp = fx - fval - delta;
            t *= temp * temp;
            let temp = fx - fx2;
            t -= delta * temp * temp;
            if t < 0.0 {
                let (f_new, x_new, step) =
                    line_search(&mut obj, &x, &displacement, config.xtol * 100.0)?;
                fval = f_new;
                x = x_new;
                if step.iter().any(|v| *v != 0.0) {
                    directions.swap_remove(biggest);
                    directions.push(step);
                }
            }
        }
    }

    if n == 0 {
        converged = fval.is_finite();
    }
    Ok(PowellResult {
        x,
        fun: fval,
        iterations,
        evaluations: obj.evals,
        converged,
    })
}

/// Objective restricted to the line `x + alpha * dir`.
struct LineCost<'a, 'b, F> {
    obj: &'a RefCell<&'b mut Counted<F>>,
    x: &'a [f64],
    dir: &'a [f64],
}

impl<F: FnMut(&[f64]) -> f64> LineCost<'_, '_, F> {
    fn point(&self, alpha: f64) -> Vec<f64> {
        self.x
            .iter()
            .zip(self.dir)
            .map(|(xi, di)| xi + alpha * di)
            .collect()
    }

    fn eval(&self, alpha: f64) -> f64 {
        let point = self.point(alpha);
        self.obj.borrow_mut().eval(&point)
    }
}

impl<F: FnMut(&[f64]) -> f64> CostFunction for LineCost<'_, '_, F> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, alpha: &f64) -> Result<f64, argmin::core::Error> {
        Ok(self.eval(*alpha))
    }
}

/// Minimize along `dir` from `x`; returns `(f_min, x_min, step)`.
fn line_search<F: FnMut(&[f64]) -> f64>(
    obj: &mut Counted<F>,
    x: &[f64],
    dir: &[f64],
    tol: f64,
) -> Result<(f64, Vec<f64>, Vec<f64>), PowellError> {
    let obj = RefCell::new(obj);
    let line = LineCost { obj: &obj, x, dir };
    let (xa, xb, xc, fb) = bracket(&mut |alpha| line.eval(alpha));
    let (lo, hi) = if xa < xc { (xa, xc) } else { (xc, xa) };
    let (mut alpha, mut fmin) = (xb, fb);
    if hi > lo && lo.is_finite() && hi.is_finite() {
        let refined = refine(LineCost { obj: &obj, x, dir }, lo, hi, tol)?;
        if let Some((a, f)) = refined.filter(|&(_, f)| f <= fb) {
            alpha = a;
            fmin = f;
        }
    }
    let step: Vec<f64> = dir.iter().map(|d| alpha * d).collect();
    Ok((fmin, line.point(alpha), step))
}

/// Brent minimization of `line` on `[lo, hi]`; `None` when the solver
/// reports no best point.
fn refine<F: FnMut(&[f64]) -> f64>(
    line: LineCost<'_, '_, F>,
    lo: f64,
    hi: f64,
    tol: f64,
) -> Result<Option<(f64, f64)>, PowellError> {
    let solver = BrentOpt::new(lo, hi).set_tolerance(tol, BRENT_ABS_TOL);
    let res = Executor::new(line, solver)
        .configure(|state| state.max_iters(BRENT_MAX_ITER))
        .run()
        .map_err(|e| PowellError::LineSearch(e.to_string()))?;
    let state = res.state();
    Ok(state
        .get_best_param()
        .map(|&alpha| (alpha, state.get_best_cost())))
}

/// Bracket a minimum starting from `[0, 1]`.
///
/// Returns `(xa, xb, xc, fb)` with `f(xb) <= f(xa), f(xc)`, or the best
/// triple found when the iteration budget runs out.
fn bracket<G: FnMut(f64) -> f64>(f: &mut G) -> (f64, f64, f64, f64) {
    let (mut xa, mut xb) = (0.0, 1.0);
    let (mut fa, mut fb) = (f(xa), f(xb));
    if fa < fb {
        std::mem::swap(&mut xa, &mut xb);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut xc = xb + GOLD * (xb - xa);
    let mut fc = f(xc);
    let mut iter = 0;
    while fc < fb {
        let tmp1 = (xb - xa) * (fb - fc);
        let tmp2 = (xb - xc) * (fb - fa);
        let val = tmp2 - tmp1;
        let denom = if val.abs() < TINY { 2.0 * TINY } else { 2.0 * val };
        let mut w = xb - ((xb - xc) * tmp2 - (xb - xa) * tmp1) / denom;
        let wlim = xb + GROW_LIMIT * (xc - xb);
        iter += 1;
        if iter > BRACKET_MAX_ITER {
            break;
        }
        let mut fw;
        if (w - xc) * (xb - w) > 0.0 {
            fw = f(w);
            if fw < fc {
                return (xb, w, xc, fw);
            } else if fw > fb {
                return (xa, xb, w, fb);
            }
            w = xc + GOLD * (xc - xb);
            fw = f(w);
        } else if (w - wlim) * (wlim - xc) >= 0.0 {
            w = wlim;
            fw = f(w);
        } else if (w - wlim) * (xc - w) > 0.0 {
            fw = f(w);
            if fw < fc {
                xb = xc;
                xc = w;
                w = xc + GOLD * (xc - xb);
                fb = fc;
                fc = fw;
                fw = f(w);
            }
        } else {
            w = xc + GOLD * (xc - xb);
            fw = f(w);
        }
        xa = xb;
        xb = xc;
        xc = w;
        fa = fb;
        fb = fc;
        fc = fw;
    }
    (xa, xb, xc, fb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimizes_shifted_quadratic() {
        let f = |x: &[f64]| (x[0] - 1.5).powi(2) + 4.0 * (x[1] + 0.5).powi(2) + 0.5 * x[0] * x[1];
        let r = minimize(f, &[0.0, 0.0], &PowellConfig::default()).unwrap();
        assert!(r.converged);
        // Gradient vanishes at the minimum.
        let gx = 2.0 * (r.x[0] - 1.5) + 0.5 * r.x[1];
        let gy = 8.0 * (r.x[1] + 0.5) + 0.5 * r.x[0];
        assert!(gx.abs() < 1e-3 && gy.abs() < 1e-3, "{:?}", r.x);
    }

    #[test]
    fn minimizes_rosenbrock() {
        let f = |x: &[f64]| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2);
        let config = PowellConfig {
            xtol: 1e-8,
            ftol: 1e-10,
            ..PowellConfig::default()
        };
        let r = minimize(f, &[-1.2, 1.0], &config).unwrap();
        assert!(r.converged);
        assert!((r.x[0] - 1.0).abs() < 1e-2 && (r.x[1] - 1.0).abs() < 1e-2, "{:?}", r.x);
    }

    #[test]
    fn infinite_regions_are_avoided() {
        // Minimum at x = 2, objective undefined for x <= 0.
        let f = |x: &[f64]| {
            if x[0] <= 0.0 {
                f64::NAN
            } else {
                x[0] - 2.0 * x[0].ln()
            }
        };
        let r = minimize(f, &[0.5], &PowellConfig::default()).unwrap();
        assert!(r.converged);
        assert!((r.x[0] - 2.0).abs() < 5e-2, "{:?}", r.x);
    }

    #[test]
    fn line_search_walks_backwards_along_direction() {
        let mut obj = Counted {
            f: |x: &[f64]| (x[0] + 3.0).powi(2) + 1.0,
            evals: 0,
        };
        let (fmin, x, step) = line_search(&mut obj, &[0.0], &[1.0], 1e-6).unwrap();
        assert!((x[0] + 3.0).abs() < 1e-4, "{x:?}");
        assert!((fmin - 1.0).abs() < 1e-8);
        assert!((step[0] + 3.0).abs() < 1e-4);
        assert!(obj.evals > 3);
    }
}

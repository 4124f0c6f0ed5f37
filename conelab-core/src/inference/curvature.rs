//! Diagonal curvature of the log density, used as the sampler's mass matrix.
//!
//! The Hessian is a central difference of the analytic gradient, taken with
//! `finitediff`. Diagonal entries that are not positive and finite fall back
//! to unit scale.

use finitediff::FiniteDiff;

use super::LogDensity;

/// Bounds on the inverse mass entries.
const MIN_INV_MASS: f64 = 1e-12;
const MAX_INV_MASS: f64 = 1e12;

/// Diagonal of `-d² log p / dz²` at `z`.
pub fn hessian_diag<M: LogDensity + ?Sized>(model: &M, z: &[f64]) -> Vec<f64> {
    let n = z.len();
    let neg_grad = |p: &Vec<f64>| -> Vec<f64> {
        let mut grad = vec![0.0; n];
        model.log_density_grad(p, &mut grad);
        grad.into_iter().map(|g| -g).collect()
    };
    let hessian = z.to_vec().central_hessian(&neg_grad);
    hessian
        .iter()
        .enumerate()
        .map(|(i, row)| row.get(i).copied().unwrap_or(f64::NAN))
        .collect()
}

/// Inverse of the diagonal mass matrix at `z`.
pub fn inverse_mass_diag<M: LogDensity + ?Sized>(model: &M, z: &[f64]) -> Vec<f64> {
    hessian_diag(model, z)
        .into_iter()
        .map(|h| {
            if h.is_finite() && h > 0.0 {
                (1.0 / h).clamp(MIN_INV_MASS, MAX_INV_MASS)
            } else {
                1.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Independent normals with standard deviations `sd`.
    struct Gaussian {
        sd: Vec<f64>,
    }

    impl LogDensity for Gaussian {
        fn dim(&self) -> usize {
            self.sd.len()
        }

        fn log_density_grad(&self, z: &[f64], grad: &mut [f64]) -> f64 {
            let mut lp = 0.0;
            for i in 0..z.len() {
                let s2 = self.sd[i] * self.sd[i];
                lp -= 0.5 * z[i] * z[i] / s2;
                grad[i] = -z[i] / s2;
            }
            lp
        }
    }

    #[test]
    fn inverse_mass_is_variance_for_gaussian() {
        let model = Gaussian {
            sd: vec![0.1, 2.0, 30.0],
        };
        let inv = inverse_mass_diag(&model, &[0.0, 1.0, -5.0]);
        for (m, sd) in inv.iter().zip(&model.sd) {
            assert!((m - sd * sd).abs() < 1e-6 * sd * sd, "{m} vs {}", sd * sd);
        }
    }

    struct Flat;

    impl LogDensity for Flat {
        fn dim(&self) -> usize {
            1
        }

        fn log_density_grad(&self, _z: &[f64], grad: &mut [f64]) -> f64 {
            grad[0] = 0.0;
            0.0
        }
    }

    /// Correlated quadratic with known Hessian `[[4, 1], [1, 9]]`.
    struct Coupled;

    impl LogDensity for Coupled {
        fn dim(&self) -> usize {
            2
        }

        fn log_density_grad(&self, z: &[f64], grad: &mut [f64]) -> f64 {
            grad[0] = -(4.0 * z[0] + z[1]);
            grad[1] = -(z[0] + 9.0 * z[1]);
            -0.5 * (4.0 * z[0] * z[0] + 2.0 * z[0] * z[1] + 9.0 * z[1] * z[1])
        }
    }

    #[test]
    fn hessian_diag_ignores_cross_terms() {
        let diag = hessian_diag(&Coupled, &[0.7, -1.3]);
        assert!((diag[0] - 4.0).abs() < 1e-6, "{diag:?}");
        assert!((diag[1] - 9.0).abs() < 1e-6, "{diag:?}");
    }

    #[test]
    fn flat_direction_falls_back_to_unit_scale() {
        assert_eq!(inverse_mass_diag(&Flat, &[0.3]), vec![1.0]);
    }
}

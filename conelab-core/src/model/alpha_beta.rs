//! Regression of strategy returns on a benchmark with Student-T residuals.
//!
//! `data` and `bmark` are aligned position-wise; NaN entries of `data` are
//! forward dates to simulate. `alpha` and `beta` start at the OLS fit of the
//! observed pairs, without which the MAP search is unreliable.

use super::spec::{
    Likelihood, Location, ModelBuilder, ModelSpec, PriorSpec, Shifted, Statistic, Value,
};
use super::{ModelKind, TRADING_DAYS};

pub fn build() -> ModelSpec {
    let mut b = ModelBuilder::new(ModelKind::AlphaBeta);
    let data = b.data("data");
    let bmark = b.data("bmark");

    let sigma = b.param(
        "sigma",
        PriorSpec::HalfCauchy { beta: 1.0.into() },
        Value::stat(Statistic::Std(data)),
    );
    let nu_minus_two = b.param(
        "nu_minus_two",
        PriorSpec::Exponential { rate: 0.1.into() },
        0.3,
    );
    let alpha = b.param(
        "alpha",
        PriorSpec::Normal {
            mu: 0.0.into(),
            sigma: 0.1.into(),
        },
        Value::stat(Statistic::OlsIntercept { y: data, x: bmark }),
    );
    let beta = b.param(
        "beta",
        PriorSpec::Normal {
            mu: 0.0.into(),
            sigma: 1.0.into(),
        },
        Value::stat(Statistic::OlsSlope { y: data, x: bmark }),
    );

    b.observe(
        "returns",
        data,
        Likelihood::StudentT {
            nu: Shifted {
                param: nu_minus_two,
                offset: 2.0,
            },
            mu: Location::Linear {
                intercept: alpha,
                slope: beta,
                covariate: bmark,
            },
            sigma,
        },
    );
    b.deterministic("annual_alpha", move |p| p[alpha] * TRADING_DAYS);
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_starts_at_ols_fit() {
        let spec = build();
        let slots = vec![
            vec![0.003, 0.005, f64::NAN, 0.009],
            vec![0.001, 0.002, 0.003, 0.004],
        ];
        let alpha = spec.params()[2].start.resolve(&slots).unwrap();
        let beta = spec.params()[3].start.resolve(&slots).unwrap();
        assert!((beta - 2.0).abs() < 1e-9);
        assert!((alpha - 0.001).abs() < 1e-12);
    }
}

//! Heavy-tailed returns model.
//!
//! Degrees of freedom are parameterized as `nu = nu_minus_two + 2` so the
//! variance `volatility² · nu / (nu - 2)` is always defined.

use super::spec::{
    Likelihood, Location, ModelBuilder, ModelSpec, PriorSpec, Shifted, Statistic, Value,
};
use super::{ModelKind, TRADING_DAYS};
use crate::distributions::student_t_variance;

pub fn build() -> ModelSpec {
    let mut b = ModelBuilder::new(ModelKind::StudentT);
    let data = b.data("data");
    let mean_return = b.param(
        "mean_return",
        PriorSpec::Normal {
            mu: 0.0.into(),
            sigma: 0.01.into(),
        },
        Value::stat(Statistic::Mean(data)),
    );
    let volatility = b.param(
        "volatility",
        PriorSpec::HalfCauchy { beta: 1.0.into() },
        Value::stat(Statistic::Std(data)),
    );
    let nu_minus_two = b.param(
        "nu_minus_two",
        PriorSpec::Exponential { rate: 0.1.into() },
        3.0,
    );
    b.observe(
        "returns",
        data,
        Likelihood::StudentT {
            nu: Shifted {
                param: nu_minus_two,
                offset: 2.0,
            },
            mu: Location::Param(mean_return),
            sigma: volatility,
        },
    );
    let annual = TRADING_DAYS.sqrt();
    let sd = move |p: &[f64]| student_t_variance(p[nu_minus_two] + 2.0, p[volatility]).sqrt();
    b.deterministic("annual_volatility", move |p| sd(p) * annual);
    b.deterministic("sharpe", move |p| p[mean_return] / sd(p) * annual);
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatility_uses_t_variance() {
        let spec = build();
        // nu = 4 -> variance = sigma² · 2
        let p = [0.0, 0.01, 2.0];
        let annual = (spec.derived()[0].expr)(&p);
        assert!((annual - 0.01 * 2f64.sqrt() * 252f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn declares_shape_parameter() {
        let spec = build();
        assert_eq!(spec.param_id("nu_minus_two"), Some(2));
        assert_eq!(spec.params()[2].start, Value::Const(3.0));
    }
}

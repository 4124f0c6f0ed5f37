//! Normal-returns model.

use super::spec::{Likelihood, Location, ModelBuilder, ModelSpec, PriorSpec, Statistic, Value};
use super::{ModelKind, TRADING_DAYS};

/// `returns ~ Normal(mean_return, volatility)` over slot `data`.
pub fn build() -> ModelSpec {
    let mut b = ModelBuilder::new(ModelKind::Normal);
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
    b.observe(
        "returns",
        data,
        Likelihood::Normal {
            mu: Location::Param(mean_return),
            sigma: volatility,
        },
    );
    let annual = TRADING_DAYS.sqrt();
    b.deterministic("annual_volatility", move |p| p[volatility] * annual);
    b.deterministic("sharpe", move |p| p[mean_return] / p[volatility] * annual);
    b.build()
}

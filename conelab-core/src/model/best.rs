//! BEST: Bayesian estimation of the difference between two groups.
//!
//! Both groups share a weakly-informative prior centred on the pooled mean,
//! group scales get uniform priors spanning three orders of magnitude around
//! the pooled std, and a single `nu = nu_minus_one + 1` couples tail weight.

use super::spec::{
    Likelihood, Location, ModelBuilder, ModelSpec, PriorSpec, Shifted, Statistic, Value,
};
use super::ModelKind;

/// Prior sd of the group means relative to the pooled std
/// (precision `1e-6 / std²`).
const MEAN_PRIOR_SCALE: f64 = 1000.0;
/// Group std priors span `[std / SPAN, std * SPAN]`.
const STD_PRIOR_SPAN: f64 = 1000.0;
/// Mean of the `nu_minus_one` exponential prior.
const NU_MEAN: f64 = 29.0;

pub fn build() -> ModelSpec {
    let mut b = ModelBuilder::new(ModelKind::Best);
    let y1 = b.data("y1");
    let y2 = b.data("y2");
    let pooled = vec![y1, y2];

    let mean_prior = || PriorSpec::Normal {
        mu: Value::stat(Statistic::PooledMean(pooled.clone())),
        sigma: Value::scaled(Statistic::PooledStd(pooled.clone()), MEAN_PRIOR_SCALE),
    };
    let std_prior = || PriorSpec::Uniform {
        lower: Value::scaled(Statistic::PooledStd(pooled.clone()), 1.0 / STD_PRIOR_SPAN),
        upper: Value::scaled(Statistic::PooledStd(pooled.clone()), STD_PRIOR_SPAN),
    };

    let group1_mean = b.param("group1_mean", mean_prior(), Value::stat(Statistic::Mean(y1)));
    let group2_mean = b.param("group2_mean", mean_prior(), Value::stat(Statistic::Mean(y2)));
    let group1_std = b.param("group1_std", std_prior(), Value::stat(Statistic::Std(y1)));
    let group2_std = b.param("group2_std", std_prior(), Value::stat(Statistic::Std(y2)));
    let nu_minus_one = b.param(
        "nu_minus_one",
        PriorSpec::Exponential {
            rate: (1.0 / NU_MEAN).into(),
        },
        NU_MEAN,
    );

    let nu = Shifted {
        param: nu_minus_one,
        offset: 1.0,
    };
    b.observe(
        "group1",
        y1,
        Likelihood::StudentT {
            nu,
            mu: Location::Param(group1_mean),
            sigma: group1_std,
        },
    );
    b.observe(
        "group2",
        y2,
        Likelihood::StudentT {
            nu,
            mu: Location::Param(group2_mean),
            sigma: group2_std,
        },
    );

    b.deterministic("difference_of_means", move |p| p[group1_mean] - p[group2_mean]);
    b.deterministic("difference_of_stds", move |p| p[group1_std] - p[group2_std]);
    b.deterministic("effect_size", move |p| {
        let pooled_sd = ((p[group1_std].powi(2) + p[group2_std].powi(2)) / 2.0).sqrt();
        (p[group1_mean] - p[group2_mean]) / pooled_sd
    });
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_priors_span_pooled_std() {
        let spec = build();
        let slots = vec![vec![-0.02, 0.02], vec![-0.02, 0.02]];
        let prior = spec.params()[2].prior.resolve(&slots).unwrap();
        match prior {
            crate::distributions::Prior::Uniform { lower, upper } => {
                assert!((lower - 0.02 / 1000.0).abs() < 1e-15);
                assert!((upper - 20.0).abs() < 1e-9);
            }
            other => panic!("unexpected prior {other:?}"),
        }
    }

    #[test]
    fn effect_size_standardizes_difference() {
        let spec = build();
        let effect = spec
            .derived()
            .iter()
            .find(|d| d.name == "effect_size")
            .unwrap();
        // means 0.3 and 0.1, stds both 0.2 -> effect 1.0
        let v = (effect.expr)(&[0.3, 0.1, 0.2, 0.2, 10.0]);
        assert!((v - 1.0).abs() < 1e-12);
    }
}

//! Model dispatch: turn return series into model inputs and run them.
//!
//! Each model variant forecasts the test period differently:
//!
//! | model        | inputs                                              |
//! |--------------|-----------------------------------------------------|
//! | `normal`, `t`| train values followed by one missing entry per test date |
//! | `best`       | `y1` = train, `y2` = test                           |
//! | `alpha_beta` | train re-indexed on the benchmark's dates           |
//!
//! The benchmark must cover every training date; `alpha_beta` fails with
//! [`RunnerError::BenchmarkGap`] otherwise.
//!
//! Missing entries are simulated per draw and exposed as the
//! `returns_missing` latent block, tagged with their dates.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::{Array1, ArrayD};

use conelab_core::{InferenceConfig, ModelKind, PosteriorTrace, ReturnSeries};

use crate::config::DEFAULT_SEED;
use crate::controller::{ModelController, RunnerError};

/// Latent block holding simulated returns for every dispatched variant.
pub const RETURNS_MISSING: &str = "returns_missing";

/// Series handed to a model run.
#[derive(Debug, Clone, Copy)]
pub struct ModelData<'a> {
    pub train: &'a ReturnSeries,
    pub test: Option<&'a ReturnSeries>,
    pub bmark: Option<&'a ReturnSeries>,
}

/// Prepared inputs plus the dates of the entries left missing.
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    pub inputs: BTreeMap<String, ArrayD<f64>>,
    pub missing_dates: Vec<NaiveDate>,
}

fn vector(values: Vec<f64>) -> ArrayD<f64> {
    Array1::from(values).into_dyn()
}

/// Build the named inputs for `kind` from the supplied series.
pub fn prepare_inputs(kind: ModelKind, data: ModelData<'_>) -> Result<PreparedInputs, RunnerError> {
    let mut inputs = BTreeMap::new();
    let missing_dates = match kind {
        ModelKind::Normal | ModelKind::StudentT => {
            let test_dates: Vec<NaiveDate> = data
                .test
                .map(|t| t.dates().to_vec())
                .unwrap_or_default();
            let mut values = data.train.values().to_vec();
            values.extend(std::iter::repeat(f64::NAN).take(test_dates.len()));
            inputs.insert("data".to_string(), vector(values));
            test_dates
        }
        ModelKind::Best => {
            let test = data.test.ok_or(RunnerError::MissingSeries {
                model: kind,
                series: "test",
            })?;
            inputs.insert("y1".to_string(), vector(data.train.values().to_vec()));
            inputs.insert("y2".to_string(), vector(test.values().to_vec()));
            Vec::new()
        }
        ModelKind::AlphaBeta => {
            let bmark = data.bmark.ok_or(RunnerError::MissingSeries {
                model: kind,
                series: "benchmark",
            })?;
            let start = data
                .train
                .first_date()
                .ok_or(RunnerError::EmptySeries("train"))?;
            let bmark = bmark.since(start);
            let gaps: Vec<NaiveDate> = data
                .train
                .dates()
                .iter()
                .filter(|d| bmark.get(**d).is_none())
                .copied()
                .collect();
            if !gaps.is_empty() {
                return Err(RunnerError::BenchmarkGap { dates: gaps });
            }
            let aligned = data.train.align_to(bmark.dates());
            let missing = bmark
                .dates()
                .iter()
                .zip(&aligned)
                .filter(|(_, v)| v.is_nan())
                .map(|(d, _)| *d)
                .collect();
            inputs.insert("data".to_string(), vector(aligned));
            inputs.insert("bmark".to_string(), vector(bmark.values().to_vec()));
            missing
        }
    };
    Ok(PreparedInputs {
        inputs,
        missing_dates,
    })
}

/// Run `kind` on `data` with explicit inference settings and seed.
pub fn run_model_with(
    kind: ModelKind,
    data: ModelData<'_>,
    config: &InferenceConfig,
    seed: u64,
) -> Result<PosteriorTrace, RunnerError> {
    let prepared = prepare_inputs(kind, data)?;
    let mut controller = ModelController::new(kind)
        .with_config(config.clone())
        .with_seed(seed);
    let mut trace = controller.run(prepared.inputs)?;
    if trace.latent(RETURNS_MISSING).is_some() {
        trace.set_latent_index(RETURNS_MISSING, prepared.missing_dates)?;
    }
    Ok(trace)
}

/// Run a model by name with `samples` retained draws.
///
/// `model_name` is one of `alpha_beta`, `t`, `normal` or `best`; any other
/// name fails before data is touched.
pub fn run_model(
    model_name: &str,
    returns_train: &ReturnSeries,
    returns_test: Option<&ReturnSeries>,
    bmark: Option<&ReturnSeries>,
    samples: usize,
) -> Result<PosteriorTrace, RunnerError> {
    let kind: ModelKind = model_name.parse()?;
    let config = InferenceConfig::default().with_samples(samples);
    run_model_with(
        kind,
        ModelData {
            train: returns_train,
            test: returns_test,
            bmark,
        },
        &config,
        DEFAULT_SEED,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use conelab_core::ModelError;

    fn day(i: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(u64::from(i))
    }

    fn series(range: std::ops::Range<u32>, f: impl Fn(u32) -> f64) -> ReturnSeries {
        ReturnSeries::new(range.clone().map(day).collect(), range.map(f).collect()).unwrap()
    }

    #[test]
    fn normal_appends_missing_test_period() {
        let train = series(0..5, |i| 0.01 * f64::from(i));
        let test = series(5..8, |_| 0.0);
        let p = prepare_inputs(
            ModelKind::Normal,
            ModelData {
                train: &train,
                test: Some(&test),
                bmark: None,
            },
        )
        .unwrap();
        let data = &p.inputs["data"];
        assert_eq!(data.len(), 8);
        assert!(data.iter().skip(5).all(|v| v.is_nan()));
        assert_eq!(p.missing_dates, test.dates());
    }

    #[test]
    fn best_requires_test_series() {
        let train = series(0..5, |_| 0.0);
        let err = prepare_inputs(
            ModelKind::Best,
            ModelData {
                train: &train,
                test: None,
                bmark: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, RunnerError::MissingSeries { .. }));
    }

    #[test]
    fn alpha_beta_aligns_on_benchmark_dates() {
        // Benchmark starts before training and covers a gap at day 3.
        let train =
            ReturnSeries::from_pairs([(day(2), 2.0), (day(4), 4.0), (day(5), 5.0)]).unwrap();
        let bmark = series(0..8, |i| 0.1 * f64::from(i));
        let p = prepare_inputs(
            ModelKind::AlphaBeta,
            ModelData {
                train: &train,
                test: None,
                bmark: Some(&bmark),
            },
        )
        .unwrap();
        let data = &p.inputs["data"];
        let b = &p.inputs["bmark"];
        assert_eq!(data.len(), 6);
        assert_eq!(b.len(), 6);
        assert_eq!(b[[0]], 0.2);
        assert_eq!(data[[0]], 2.0);
        assert!(data[[1]].is_nan());
        assert_eq!(p.missing_dates, vec![day(3), day(6), day(7)]);
    }

    #[test]
    fn alpha_beta_rejects_training_dates_missing_from_benchmark() {
        let train = series(0..10, |i| 0.001 * f64::from(i));
        let bmark = ReturnSeries::from_pairs((0..10).step_by(2).map(|i| (day(i), 0.002))).unwrap();
        let err = prepare_inputs(
            ModelKind::AlphaBeta,
            ModelData {
                train: &train,
                test: None,
                bmark: Some(&bmark),
            },
        )
        .unwrap_err();
        match err {
            RunnerError::BenchmarkGap { dates } => {
                assert_eq!(dates, vec![day(1), day(3), day(5), day(7), day(9)]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_model_rejected() {
        let train = series(0..30, |i| 0.001 * f64::from(i % 7));
        let err = run_model("foo", &train, None, None, 10).unwrap_err();
        match err {
            RunnerError::Model(ModelError::UnknownModel { name, valid }) => {
                assert_eq!(name, "foo");
                assert_eq!(valid.len(), 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

//! Dispatch, controller and cone orchestration with real inference runs.

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use conelab_core::{InferenceConfig, ModelError, ModelKind, ReturnSeries};
use conelab_runner::{
    analyze_best, plot_bayes_cone, run_model, run_model_with, ConeRequest, ModelData,
    RunnerError, RETURNS_MISSING,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 3).unwrap() + Days::new(i as u64)
}

fn noise(n: usize, mu: f64, sd: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Normal::new(mu, sd).unwrap();
    (0..n).map(|_| dist.sample(&mut rng)).collect()
}

fn series(from: usize, values: Vec<f64>) -> ReturnSeries {
    let dates = (from..from + values.len()).map(day).collect();
    ReturnSeries::new(dates, values).unwrap()
}

fn quick(samples: usize) -> InferenceConfig {
    InferenceConfig {
        samples,
        warmup: 300,
        ..InferenceConfig::default()
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────

#[test]
fn foo_is_not_a_model() {
    let train = series(0, noise(50, 0.0, 0.01, 1));
    let err = run_model("foo", &train, None, None, 100).unwrap_err();
    match err {
        RunnerError::Model(ModelError::UnknownModel { valid, .. }) => {
            for name in ["alpha_beta", "t", "normal", "best"] {
                assert!(valid.iter().any(|v| v == name), "{name}");
            }
        }
        other => panic!("expected UnknownModel, got {other:?}"),
    }
}

#[test]
fn student_t_forecasts_every_test_date() {
    let train = series(0, noise(150, 0.0005, 0.01, 2));
    let test = series(150, noise(10, 0.0005, 0.01, 3));
    let trace = run_model("t", &train, Some(&test), None, 200).unwrap();
    assert_eq!(trace.len(), 200);
    let block = trace.latent(RETURNS_MISSING).unwrap();
    assert_eq!(block.draws.dim(), (200, 10));
    assert_eq!(block.index.as_deref(), Some(test.dates()));
    assert!(trace.get("nu_minus_two").is_some());
}

#[test]
fn best_requires_a_test_series() {
    let train = series(0, noise(50, 0.0, 0.01, 4));
    let err = run_model("best", &train, None, None, 100).unwrap_err();
    assert!(matches!(err, RunnerError::MissingSeries { .. }));
}

#[test]
fn best_summary_from_dispatched_run() {
    let train = series(0, noise(100, 0.006, 0.01, 21));
    let test = series(100, noise(100, 0.0, 0.01, 22));
    let trace = run_model_with(
        ModelKind::Best,
        ModelData {
            train: &train,
            test: Some(&test),
            bmark: None,
        },
        &quick(800),
        23,
    )
    .unwrap();
    let summary = analyze_best(&trace, 200).unwrap();
    assert_eq!(summary.draws, 600);
    assert!(summary.difference_of_means.mean > 0.0);
    assert!(summary.group1_std.mean > 0.005 && summary.group1_std.mean < 0.02);
}

#[test]
fn alpha_beta_recovers_beta_and_forecasts_benchmark_dates() {
    let bmark_values = noise(200, 0.0003, 0.01, 31);
    let eps = noise(200, 0.0, 0.004, 32);
    let strategy: Vec<f64> = bmark_values
        .iter()
        .zip(&eps)
        .map(|(b, e)| 0.0002 + 1.2 * b + e)
        .collect();
    let bmark = series(0, bmark_values);
    let train = series(0, strategy[..160].to_vec());
    let test = series(160, strategy[160..].to_vec());

    let trace = run_model_with(
        ModelKind::AlphaBeta,
        ModelData {
            train: &train,
            test: Some(&test),
            bmark: Some(&bmark),
        },
        &quick(400),
        33,
    )
    .unwrap();
    let beta = trace.burn(100).summarize("beta").unwrap();
    assert!((beta.mean - 1.2).abs() < 0.15, "{beta:?}");

    let block = trace.latent(RETURNS_MISSING).unwrap();
    assert_eq!(block.n_entries(), 40);
    assert_eq!(block.index.as_deref(), Some(test.dates()));
}

// ── Cone ─────────────────────────────────────────────────────────────

#[test]
fn cone_from_fresh_run_is_scored() {
    let train = series(0, noise(200, 0.0, 0.01, 41));
    let test = series(200, noise(15, 0.0, 0.01, 42));
    let (score, trace) = plot_bayes_cone(
        &train,
        &test,
        "normal",
        ConeRequest {
            inference: quick(300),
            ..ConeRequest::default()
        },
    )
    .unwrap();
    assert!((0.0..=100.0).contains(&score), "score {score}");
    assert_eq!(trace.len(), 300);

    // Re-scoring the returned trace reproduces the score without rerunning.
    let (again, _) = plot_bayes_cone(
        &train,
        &test,
        "normal",
        ConeRequest {
            trace: Some(trace),
            ..ConeRequest::default()
        },
    )
    .unwrap();
    assert_eq!(score, again);
}

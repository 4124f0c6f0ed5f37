//! Bayesian cone: forecast the test period from a posterior and score how
//! the realized returns sit inside it.
//!
//! Rendering is delegated to a [`ConeRenderer`]; the numbers never depend on
//! whether rendering succeeds.

use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use conelab_core::{InferenceConfig, ModelKind, PosteriorTrace, ReturnSeries};

use crate::cone::{compute_bayes_cone, compute_consistency_score, ConeError, ConePercentiles};
use crate::config::{ConeConfig, DEFAULT_SEED};
use crate::controller::RunnerError;
use crate::dispatch::{run_model_with, ModelData, RETURNS_MISSING};
use crate::profiling::ProfileScope;

#[derive(Debug, Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

impl RenderError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Everything needed to draw a cone chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConePlot {
    /// Model name as passed to [`plot_bayes_cone`].
    pub model: String,
    /// Trailing training dates and their cumulative wealth from 1.0.
    pub train_dates: Vec<NaiveDate>,
    pub train_cum: Vec<f64>,
    /// Test dates and realized cumulative wealth continuing from the train path.
    pub test_dates: Vec<NaiveDate>,
    pub test_cum: Vec<f64>,
    pub cone: ConePercentiles,
    pub score: f64,
}

/// Output sink for [`ConePlot`]s.
pub trait ConeRenderer {
    fn render(&mut self, plot: &ConePlot) -> Result<(), RenderError>;
}

/// Optional inputs to [`plot_bayes_cone`].
pub struct ConeRequest<'a> {
    pub bmark: Option<&'a ReturnSeries>,
    pub trace: Option<PosteriorTrace>,
    pub renderer: Option<&'a mut dyn ConeRenderer>,
    pub cone: ConeConfig,
    pub inference: InferenceConfig,
    pub seed: u64,
}

impl Default for ConeRequest<'_> {
    fn default() -> Self {
        let cone = ConeConfig::default();
        Self {
            bmark: None,
            trace: None,
            renderer: None,
            inference: InferenceConfig::default().with_samples(cone.samples),
            cone,
            seed: DEFAULT_SEED,
        }
    }
}

/// Simulated test-period returns (`draws × test dates`) from a trace.
fn test_predictions(
    trace: &PosteriorTrace,
    returns_test: &ReturnSeries,
) -> Result<Array2<f64>, ConeError> {
    let block = trace.latent(RETURNS_MISSING).ok_or_else(|| {
        ConeError::MissingSimulations(format!("trace has no '{RETURNS_MISSING}' block"))
    })?;
    if let Some(preds) = block.select_dates(returns_test.dates()) {
        return Ok(preds);
    }
    if block.index.is_none() && block.n_entries() == returns_test.len() {
        return Ok(block.draws.clone());
    }
    Err(ConeError::MissingSimulations(format!(
        "'{RETURNS_MISSING}' does not cover the {} test dates",
        returns_test.len()
    )))
}

/// Forecast cone for `returns_test`, returning the consistency score and
/// the trace used.
///
/// The model name is parsed and the model run only when `request.trace` is
/// `None`; a supplied trace is scored as is. The cone starts at the final
/// cumulative value of the training path.
pub fn plot_bayes_cone(
    returns_train: &ReturnSeries,
    returns_test: &ReturnSeries,
    model: &str,
    request: ConeRequest<'_>,
) -> Result<(f64, PosteriorTrace), RunnerError> {
    let _scope = ProfileScope::new("plot_bayes_cone");
    let trace = match request.trace {
        Some(trace) => trace,
        None => {
            let kind: ModelKind = model.parse()?;
            run_model_with(
                kind,
                ModelData {
                    train: returns_train,
                    test: Some(returns_test),
                    bmark: request.bmark,
                },
                &request.inference,
                request.seed,
            )?
        }
    };

    let preds = test_predictions(&trace, returns_test)?;
    let score = compute_consistency_score(returns_test.values(), preds.view())?;

    let train_cum = returns_train.cum_returns(1.0);
    let last = *train_cum
        .last()
        .ok_or(RunnerError::EmptySeries("train"))?;
    let cone = compute_bayes_cone(preds.view(), last)?.with_index(returns_test.dates().to_vec())?;

    let tail_from = train_cum.len().saturating_sub(request.cone.plot_train_len);
    let plot = ConePlot {
        model: model.to_string(),
        train_dates: returns_train.dates()[tail_from..].to_vec(),
        train_cum: train_cum[tail_from..].to_vec(),
        test_dates: returns_test.dates().to_vec(),
        test_cum: returns_test.cum_returns(last),
        cone,
        score,
    };
    tracing::info!(model, score, steps = returns_test.len(), "cone computed");

    if let Some(renderer) = request.renderer {
        if let Err(error) = renderer.render(&plot) {
            tracing::warn!(%error, "cone rendering failed");
        }
    }
    Ok((score, trace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use conelab_core::{LatentBlock, SamplerStats};

    fn day(i: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 1).unwrap() + chrono::Days::new(i)
    }

    fn series(from: u64, values: Vec<f64>) -> ReturnSeries {
        let dates = (from..from + values.len() as u64).map(day).collect();
        ReturnSeries::new(dates, values).unwrap()
    }

    /// Trace whose simulated returns are a fixed grid around zero.
    fn trace_for(test: &ReturnSeries) -> PosteriorTrace {
        let s = 40;
        let draws = Array2::from_shape_fn((s, test.len()), |(i, _)| {
            (i as f64 - (s as f64 - 1.0) / 2.0) * 0.001
        });
        let mut latent = BTreeMap::new();
        latent.insert(
            RETURNS_MISSING.to_string(),
            LatentBlock {
                positions: (0..test.len()).collect(),
                index: Some(test.dates().to_vec()),
                draws,
            },
        );
        PosteriorTrace::new(s, Vec::new(), latent, SamplerStats::default()).unwrap()
    }

    struct Recorder {
        plots: Vec<ConePlot>,
    }

    impl ConeRenderer for Recorder {
        fn render(&mut self, plot: &ConePlot) -> Result<(), RenderError> {
            self.plots.push(plot.clone());
            Ok(())
        }
    }

    struct Failing;

    impl ConeRenderer for Failing {
        fn render(&mut self, _plot: &ConePlot) -> Result<(), RenderError> {
            Err(RenderError::new("disk full"))
        }
    }

    #[test]
    fn supplied_trace_is_scored_and_rendered() {
        let train = series(0, vec![0.01; 80]);
        let test = series(80, vec![0.0; 5]);
        let mut recorder = Recorder { plots: Vec::new() };
        let (score, _) = plot_bayes_cone(
            &train,
            &test,
            "t",
            ConeRequest {
                trace: Some(trace_for(&test)),
                renderer: Some(&mut recorder),
                ..ConeRequest::default()
            },
        )
        .unwrap();
        // Realized zero returns sit exactly at the simulated median.
        assert_eq!(score, 100.0);

        let plot = &recorder.plots[0];
        assert_eq!(plot.train_cum.len(), 50);
        assert_eq!(plot.train_dates.len(), 50);
        let last = 1.01f64.powi(80);
        assert!((plot.train_cum[49] - last).abs() < 1e-9);
        assert!((plot.test_cum[4] - last).abs() < 1e-9);
        assert_eq!(plot.cone.index().unwrap(), test.dates());
        let lo = plot.cone.band(5).unwrap()[0];
        let hi = plot.cone.band(95).unwrap()[0];
        assert!(lo < last && last < hi);
    }

    #[test]
    fn renderer_failure_keeps_result() {
        let train = series(0, vec![0.01; 10]);
        let test = series(10, vec![0.0; 3]);
        let mut failing = Failing;
        let (score, trace) = plot_bayes_cone(
            &train,
            &test,
            "normal",
            ConeRequest {
                trace: Some(trace_for(&test)),
                renderer: Some(&mut failing),
                ..ConeRequest::default()
            },
        )
        .unwrap();
        assert_eq!(score, 100.0);
        assert_eq!(trace.len(), 40);
    }

    #[test]
    fn trace_without_simulations_is_rejected() {
        let train = series(0, vec![0.01; 10]);
        let test = series(10, vec![0.0; 3]);
        let trace =
            PosteriorTrace::new(0, Vec::new(), BTreeMap::new(), SamplerStats::default()).unwrap();
        let err = plot_bayes_cone(
            &train,
            &test,
            "normal",
            ConeRequest {
                trace: Some(trace),
                ..ConeRequest::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Cone(ConeError::MissingSimulations(_))
        ));
    }

    #[test]
    fn supplied_trace_skips_model_lookup() {
        let train = series(0, vec![0.01; 10]);
        let test = series(10, vec![0.0; 3]);
        let mut recorder = Recorder { plots: Vec::new() };
        let (score, _) = plot_bayes_cone(
            &train,
            &test,
            "foo",
            ConeRequest {
                trace: Some(trace_for(&test)),
                renderer: Some(&mut recorder),
                ..ConeRequest::default()
            },
        )
        .unwrap();
        assert_eq!(score, 100.0);
        assert_eq!(recorder.plots[0].model, "foo");
    }

    #[test]
    fn unknown_model_fails_first() {
        let train = series(0, vec![0.01; 10]);
        let test = series(10, vec![0.0; 3]);
        assert!(matches!(
            plot_bayes_cone(&train, &test, "foo", ConeRequest::default()),
            Err(RunnerError::Model(_))
        ));
    }
}

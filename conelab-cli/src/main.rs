//! ConeLab CLI — run return models, score Bayesian cones, compare groups.
//!
//! Commands:
//! - `run`: sample a model's posterior and print column summaries as JSON
//! - `cone`: forecast a test period, print the consistency score, optionally
//!   write the cone to CSV
//! - `best`: BEST comparison of two return series
//!
//! Return files are CSV with a header row and `date,return` columns, dates as
//! `YYYY-MM-DD`. Set `RUST_LOG` to control log output and `CONELAB_PROFILE=1`
//! to report timing scopes.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use conelab_core::{ModelKind, PosteriorTrace, ReturnSeries};
use conelab_runner::{
    analyze_best, plot_bayes_cone, profiling, run_model_with, ConePlot, ConeRenderer,
    ConeRequest, ModelData, RenderError, RunnerConfig, CONE_LEVELS,
};

#[derive(Parser)]
#[command(name = "conelab", about = "ConeLab CLI — Bayesian return models and forecast cones")]
struct Cli {
    /// Path to a TOML runner config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Master seed; overrides the config file.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SeriesArgs {
    /// Model: alpha_beta, t, normal or best.
    #[arg(long, default_value = "t")]
    model: String,

    /// Training returns CSV.
    #[arg(long)]
    train: PathBuf,

    /// Test-period returns CSV.
    #[arg(long)]
    test: Option<PathBuf>,

    /// Benchmark returns CSV (alpha_beta only).
    #[arg(long)]
    bmark: Option<PathBuf>,

    /// Retained posterior draws; overrides the config file.
    #[arg(long)]
    samples: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a model's posterior and print a JSON summary.
    Run {
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Score the test period against the model's forecast cone.
    Cone {
        #[command(flatten)]
        series: SeriesArgs,

        /// Trailing training observations included in the plot data.
        #[arg(long)]
        plot_train_len: Option<usize>,

        /// Write the cone and paths to this CSV file.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compare two groups of returns with BEST.
    Best {
        /// First group's returns CSV.
        #[arg(long)]
        group1: PathBuf,

        /// Second group's returns CSV.
        #[arg(long)]
        group2: PathBuf,

        /// Leading draws discarded before summarizing.
        #[arg(long)]
        burn: Option<usize>,

        /// Retained posterior draws; overrides the config file.
        #[arg(long)]
        samples: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    profiling::init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunnerConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    match cli.command {
        Commands::Run { series } => run_cmd(series, config),
        Commands::Cone {
            series,
            plot_train_len,
            out,
        } => cone_cmd(series, plot_train_len, out, config),
        Commands::Best {
            group1,
            group2,
            burn,
            samples,
        } => best_cmd(&group1, &group2, burn, samples, config),
    }
}

#[derive(Deserialize)]
struct ReturnRow {
    date: NaiveDate,
    #[serde(rename = "return")]
    value: f64,
}

fn load_returns(path: &Path) -> Result<ReturnSeries> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut pairs = Vec::new();
    for (line, row) in reader.deserialize::<ReturnRow>().enumerate() {
        let row = row.with_context(|| format!("{}: row {}", path.display(), line + 1))?;
        pairs.push((row.date, row.value));
    }
    ReturnSeries::from_pairs(pairs).with_context(|| format!("invalid series in {}", path.display()))
}

fn load_optional(path: Option<&PathBuf>) -> Result<Option<ReturnSeries>> {
    path.map(|p| load_returns(p)).transpose()
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn trace_json(kind: ModelKind, trace: &PosteriorTrace) -> serde_json::Value {
    let latent: serde_json::Map<String, serde_json::Value> = trace
        .latent_names()
        .filter_map(|name| {
            let block = trace.latent(name)?;
            Some((
                name.to_string(),
                json!({ "entries": block.n_entries(), "dates": block.index }),
            ))
        })
        .collect();
    json!({
        "model": kind,
        "draws": trace.len(),
        "sampler": trace.stats(),
        "summary": trace.summary(),
        "latent": latent,
    })
}

fn run_cmd(args: SeriesArgs, mut config: RunnerConfig) -> Result<()> {
    let kind: ModelKind = args.model.parse()?;
    if let Some(samples) = args.samples {
        config.inference.samples = samples;
    }
    let train = load_returns(&args.train)?;
    let test = load_optional(args.test.as_ref())?;
    let bmark = load_optional(args.bmark.as_ref())?;

    let trace = run_model_with(
        kind,
        ModelData {
            train: &train,
            test: test.as_ref(),
            bmark: bmark.as_ref(),
        },
        &config.inference,
        config.seed,
    )?;
    print_json(&trace_json(kind, &trace))
}

/// Writes one CSV row per date: training path, realized test path and bands.
struct CsvConeWriter {
    path: PathBuf,
}

impl CsvConeWriter {
    fn write(&self, plot: &ConePlot) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        let mut header = vec!["date".to_string(), "cumulative".to_string()];
        header.extend(CONE_LEVELS.iter().map(|l| format!("p{l}")));
        writer.write_record(&header)?;

        let blank = || vec![String::new(); CONE_LEVELS.len()];
        for (date, value) in plot.train_dates.iter().zip(&plot.train_cum) {
            let mut record = vec![date.to_string(), value.to_string()];
            record.extend(blank());
            writer.write_record(&record)?;
        }
        for (j, (date, value)) in plot.test_dates.iter().zip(&plot.test_cum).enumerate() {
            let mut record = vec![date.to_string(), value.to_string()];
            record.extend(CONE_LEVELS.iter().map(|&l| {
                plot.cone
                    .band(l)
                    .and_then(|b| b.get(j))
                    .map_or_else(String::new, f64::to_string)
            }));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ConeRenderer for CsvConeWriter {
    fn render(&mut self, plot: &ConePlot) -> Result<(), RenderError> {
        self.write(plot).map_err(RenderError::new)?;
        tracing::info!(path = %self.path.display(), "cone written");
        Ok(())
    }
}

fn cone_cmd(
    args: SeriesArgs,
    plot_train_len: Option<usize>,
    out: Option<PathBuf>,
    mut config: RunnerConfig,
) -> Result<()> {
    let kind: ModelKind = args.model.parse()?;
    if let Some(samples) = args.samples {
        config.cone.samples = samples;
    }
    if let Some(len) = plot_train_len {
        config.cone.plot_train_len = len;
    }
    let train = load_returns(&args.train)?;
    let test_path = args
        .test
        .as_ref()
        .context("the cone command needs --test")?;
    let test = load_returns(test_path)?;
    let bmark = load_optional(args.bmark.as_ref())?;

    let mut writer = out.map(|path| CsvConeWriter { path });
    let request = ConeRequest {
        bmark: bmark.as_ref(),
        trace: None,
        renderer: writer.as_mut().map(|w| w as &mut dyn ConeRenderer),
        inference: config.inference.clone().with_samples(config.cone.samples),
        cone: config.cone.clone(),
        seed: config.seed,
    };
    let (score, trace) = plot_bayes_cone(&train, &test, kind.name(), request)?;
    print_json(&json!({
        "model": kind,
        "score": score,
        "draws": trace.len(),
        "test_days": test.len(),
    }))
}

fn best_cmd(
    group1: &Path,
    group2: &Path,
    burn: Option<usize>,
    samples: Option<usize>,
    mut config: RunnerConfig,
) -> Result<()> {
    if let Some(samples) = samples {
        config.inference.samples = samples;
    }
    let y1 = load_returns(group1)?;
    let y2 = load_returns(group2)?;
    let trace = run_model_with(
        ModelKind::Best,
        ModelData {
            train: &y1,
            test: Some(&y2),
            bmark: None,
        },
        &config.inference,
        config.seed,
    )?;
    let summary = analyze_best(&trace, burn.unwrap_or(config.best.burn))?;
    print_json(&serde_json::to_value(&summary)?)
}

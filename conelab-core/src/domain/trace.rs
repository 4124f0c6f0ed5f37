//! PosteriorTrace: the ensemble of posterior draws produced by one inference run.
//!
//! Columns hold one value per draw for every free parameter and deterministic
//! quantity. Latent blocks hold the simulated values of missing observations
//! as an `S × T` matrix (draws × missing entries); they are keyed
//! `<term>_missing`, e.g. `returns_missing`.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::NaiveDate;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::{mean, percentile_sorted, sort_floats};

/// Suffix appended to an observed term's name to key its latent block.
pub const MISSING_SUFFIX: &str = "_missing";

/// Errors from assembling or re-indexing a trace.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    #[error("column '{name}' has {got} draws, expected {expected}")]
    RaggedColumn {
        name: String,
        got: usize,
        expected: usize,
    },
    #[error("no latent block named '{0}'")]
    UnknownLatent(String),
    #[error("latent block '{name}' has {columns} entries but {index} dates were supplied")]
    IndexLength {
        name: String,
        columns: usize,
        index: usize,
    },
}

/// Simulated values for the missing entries of one observed term.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentBlock {
    /// Positions of the missing entries within the observed slot.
    pub positions: Vec<usize>,
    /// Dates of the missing entries, when the caller knows them.
    pub index: Option<Vec<NaiveDate>>,
    /// `draws × positions.len()` simulated values.
    pub draws: Array2<f64>,
}

impl LatentBlock {
    pub fn n_entries(&self) -> usize {
        self.positions.len()
    }

    /// Columns whose dates appear in `dates`, in the order of `dates`.
    ///
    /// Returns `None` if the block has no date index or a date is absent.
    pub fn select_dates(&self, dates: &[NaiveDate]) -> Option<Array2<f64>> {
        let index = self.index.as_ref()?;
        let mut cols = Vec::with_capacity(dates.len());
        for d in dates {
            cols.push(index.iter().position(|x| x == d)?);
        }
        Some(self.draws.select(ndarray::Axis(1), &cols))
    }
}

/// Sampler diagnostics attached to a trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerStats {
    /// Step size after warmup adaptation.
    pub step_size: f64,
    /// Number of retained transitions that diverged.
    pub divergences: usize,
    /// Mean acceptance statistic over retained transitions.
    pub mean_accept: f64,
    /// Mean tree depth over retained transitions.
    pub mean_tree_depth: f64,
    /// Warmup transitions discarded before retention.
    pub warmup: usize,
    /// MAP starting point in constrained space, by parameter name.
    pub map_point: BTreeMap<String, f64>,
}

/// Posterior summary for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub p2_5: f64,
    pub p50: f64,
    pub p97_5: f64,
}

/// Ensemble of posterior draws.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorTrace {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    latent: BTreeMap<String, LatentBlock>,
    stats: SamplerStats,
    n_draws: usize,
}

impl PosteriorTrace {
    /// Assemble a trace; every column and latent block must hold `n_draws` rows.
    pub fn new(
        n_draws: usize,
        columns: Vec<(String, Vec<f64>)>,
        latent: BTreeMap<String, LatentBlock>,
        stats: SamplerStats,
    ) -> Result<Self, TraceError> {
        for (name, col) in &columns {
            if col.len() != n_draws {
                return Err(TraceError::RaggedColumn {
                    name: name.clone(),
                    got: col.len(),
                    expected: n_draws,
                });
            }
        }
        for (name, block) in &latent {
            if block.draws.nrows() != n_draws {
                return Err(TraceError::RaggedColumn {
                    name: name.clone(),
                    got: block.draws.nrows(),
                    expected: n_draws,
                });
            }
        }
        let (names, columns) = columns.into_iter().unzip();
        Ok(Self {
            names,
            columns,
            latent,
            stats,
            n_draws,
        })
    }

    /// Number of draws.
    pub fn len(&self) -> usize {
        self.n_draws
    }

    pub fn is_empty(&self) -> bool {
        self.n_draws == 0
    }

    /// Names of the scalar columns (free parameters, then deterministics).
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Names of the latent blocks.
    pub fn latent_names(&self) -> impl Iterator<Item = &str> {
        self.latent.keys().map(String::as_str)
    }

    /// Draws of a scalar column.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Simulated missing observations, e.g. `latent("returns_missing")`.
    pub fn latent(&self, name: &str) -> Option<&LatentBlock> {
        self.latent.get(name)
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    /// Attach a date index to a latent block for output alignment.
    pub fn set_latent_index(
        &mut self,
        name: &str,
        index: Vec<NaiveDate>,
    ) -> Result<(), TraceError> {
        let block = self
            .latent
            .get_mut(name)
            .ok_or_else(|| TraceError::UnknownLatent(name.to_string()))?;
        if block.n_entries() != index.len() {
            return Err(TraceError::IndexLength {
                name: name.to_string(),
                columns: block.n_entries(),
                index: index.len(),
            });
        }
        block.index = Some(index);
        Ok(())
    }

    /// Positional slice over draws (clamped to the trace length).
    pub fn slice(&self, range: Range<usize>) -> PosteriorTrace {
        let start = range.start.min(self.n_draws);
        let end = range.end.clamp(start, self.n_draws);
        let columns = self.columns.iter().map(|c| c[start..end].to_vec()).collect();
        let latent = self
            .latent
            .iter()
            .map(|(name, block)| {
                (
                    name.clone(),
                    LatentBlock {
                        positions: block.positions.clone(),
                        index: block.index.clone(),
                        draws: block.draws.slice(s![start..end, ..]).to_owned(),
                    },
                )
            })
            .collect();
        PosteriorTrace {
            names: self.names.clone(),
            columns,
            latent,
            stats: self.stats.clone(),
            n_draws: end - start,
        }
    }

    /// Discard the first `n` draws as burn-in.
    pub fn burn(&self, n: usize) -> PosteriorTrace {
        self.slice(n..self.n_draws)
    }

    /// Mean, sd, and 2.5/50/97.5 percentiles of a column.
    pub fn summarize(&self, name: &str) -> Option<ColumnSummary> {
        let col = self.get(name)?;
        let m = mean(col);
        let sd = if col.len() > 1 {
            (col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (col.len() - 1) as f64).sqrt()
        } else {
            0.0
        };
        let mut sorted = col.to_vec();
        sort_floats(&mut sorted);
        Some(ColumnSummary {
            name: name.to_string(),
            mean: m,
            sd,
            p2_5: percentile_sorted(&sorted, 2.5),
            p50: percentile_sorted(&sorted, 50.0),
            p97_5: percentile_sorted(&sorted, 97.5),
        })
    }

    /// Summaries of every scalar column, in column order.
    pub fn summary(&self) -> Vec<ColumnSummary> {
        self.names
            .iter()
            .filter_map(|n| self.summarize(n))
            .collect()
    }
}

//! Numeric summary of a BEST (two-group) posterior.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use conelab_core::{ColumnSummary, PosteriorTrace};

/// Leading draws discarded by default.
pub const DEFAULT_BURN: usize = 200;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SummaryError {
    #[error("trace has no column '{0}'; was it produced by the best model?")]
    MissingColumn(&'static str),
    #[error("no draws left after discarding {burn} of {draws}")]
    NoDraws { burn: usize, draws: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestSummary {
    pub group1_mean: ColumnSummary,
    pub group2_mean: ColumnSummary,
    pub group1_std: ColumnSummary,
    pub group2_std: ColumnSummary,
    pub difference_of_means: ColumnSummary,
    pub difference_of_stds: ColumnSummary,
    pub effect_size: ColumnSummary,
    /// Degrees of freedom, `nu_minus_one + 1`.
    pub nu_mean: f64,
    /// 95% interval of the effect size excludes zero.
    pub credible: bool,
    /// Draws summarized after burn-in.
    pub draws: usize,
}

impl BestSummary {
    pub fn effect_size_interval(&self) -> (f64, f64) {
        (self.effect_size.p2_5, self.effect_size.p97_5)
    }
}

/// Summarize a BEST trace after dropping the first `burn` draws.
pub fn analyze_best(trace: &PosteriorTrace, burn: usize) -> Result<BestSummary, SummaryError> {
    let kept = trace.burn(burn);
    if kept.is_empty() {
        return Err(SummaryError::NoDraws {
            burn,
            draws: trace.len(),
        });
    }
    let column = |name: &'static str| {
        kept.summarize(name)
            .ok_or(SummaryError::MissingColumn(name))
    };
    let effect_size = column("effect_size")?;
    let nu_mean = column("nu_minus_one")?.mean + 1.0;
    let credible = effect_size.p2_5 > 0.0 || effect_size.p97_5 < 0.0;
    Ok(BestSummary {
        group1_mean: column("group1_mean")?,
        group2_mean: column("group2_mean")?,
        group1_std: column("group1_std")?,
        group2_std: column("group2_std")?,
        difference_of_means: column("difference_of_means")?,
        difference_of_stds: column("difference_of_stds")?,
        effect_size,
        nu_mean,
        credible,
        draws: kept.len(),
    })
}

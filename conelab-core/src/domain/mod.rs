//! Domain types: return series and posterior traces.

pub mod returns;
pub mod trace;

pub use returns::{cum_returns, ReturnSeries, SeriesError};
pub use trace::{ColumnSummary, LatentBlock, PosteriorTrace, SamplerStats, TraceError, MISSING_SUFFIX};

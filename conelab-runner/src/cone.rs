//! Cone analytics: percentile bands of simulated wealth paths and the
//! consistency score of a realized path against them.
//!
//! Both operate on an `S × T` matrix of simulated simple returns (one row per
//! posterior draw, one column per forecast date).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use conelab_core::cum_returns;
use conelab_core::stats::{percentile_of_score_weak, percentile_sorted, sort_floats};

/// Band levels reported by [`compute_bayes_cone`].
pub const CONE_LEVELS: [u8; 4] = [5, 25, 75, 95];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConeError {
    #[error("simulation matrix is empty ({draws} draws x {steps} steps)")]
    Empty { draws: usize, steps: usize },
    #[error("realized path has {realized} returns but simulations cover {steps} steps")]
    LengthMismatch { realized: usize, steps: usize },
    #[error("simulated return at draw {draw}, step {step} is not finite")]
    NonFinite { draw: usize, step: usize },
    #[error("no simulated returns available: {0}")]
    MissingSimulations(String),
}

/// Percentile bands of cumulative wealth, one value per forecast step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConePercentiles {
    index: Option<Vec<NaiveDate>>,
    bands: BTreeMap<u8, Vec<f64>>,
}

impl ConePercentiles {
    /// Band at `level` (one of [`CONE_LEVELS`]).
    pub fn band(&self, level: u8) -> Option<&[f64]> {
        self.bands.get(&level).map(Vec::as_slice)
    }

    pub fn levels(&self) -> impl Iterator<Item = u8> + '_ {
        self.bands.keys().copied()
    }

    /// Number of forecast steps.
    pub fn len(&self) -> usize {
        self.bands.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self) -> Option<&[NaiveDate]> {
        self.index.as_deref()
    }

    /// Attach dates to the steps.
    pub fn with_index(mut self, index: Vec<NaiveDate>) -> Result<Self, ConeError> {
        if index.len() != self.len() {
            return Err(ConeError::LengthMismatch {
                realized: index.len(),
                steps: self.len(),
            });
        }
        self.index = Some(index);
        Ok(self)
    }
}

/// Reject empty or non-finite simulation matrices.
fn check_preds(preds: ArrayView2<'_, f64>) -> Result<(), ConeError> {
    let (draws, steps) = preds.dim();
    if draws == 0 || steps == 0 {
        return Err(ConeError::Empty { draws, steps });
    }
    if let Some(((draw, step), _)) = preds.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(ConeError::NonFinite { draw, step });
    }
    Ok(())
}

/// Compound each row of simulated returns into a wealth path.
pub fn cumulative_paths(preds: ArrayView2<'_, f64>, starting_value: f64) -> Array2<f64> {
    let mut paths = preds.mapv(|r| 1.0 + r);
    paths.accumulate_axis_inplace(Axis(1), |prev, cur| *cur *= *prev);
    paths *= starting_value;
    paths
}

/// Sorted columns of a path matrix, computed in parallel.
fn sorted_columns(paths: &Array2<f64>) -> Vec<Vec<f64>> {
    (0..paths.ncols())
        .into_par_iter()
        .map(|j| {
            let mut col = paths.column(j).to_vec();
            sort_floats(&mut col);
            col
        })
        .collect()
}

/// 5/25/75/95 percentile bands of the cumulative wealth implied by `preds`.
pub fn compute_bayes_cone(
    preds: ArrayView2<'_, f64>,
    starting_value: f64,
) -> Result<ConePercentiles, ConeError> {
    check_preds(preds)?;
    let columns = sorted_columns(&cumulative_paths(preds, starting_value));
    let bands = CONE_LEVELS
        .iter()
        .map(|&level| {
            let band = columns
                .iter()
                .map(|col| percentile_sorted(col, f64::from(level)))
                .collect();
            (level, band)
        })
        .collect();
    Ok(ConePercentiles { index: None, bands })
}

/// Score in `[0, 100]` of how central the realized path sits in the
/// simulated distribution; 100 means it tracked the median throughout.
///
/// Both paths start from 1.0. Each step's weak percentile rank of the
/// realized value is averaged, and the score falls linearly with the
/// average's distance from 50.
pub fn compute_consistency_score(
    returns_test: &[f64],
    preds: ArrayView2<'_, f64>,
) -> Result<f64, ConeError> {
    check_preds(preds)?;
    if returns_test.len() != preds.ncols() {
        return Err(ConeError::LengthMismatch {
            realized: returns_test.len(),
            steps: preds.ncols(),
        });
    }
    let realized = cum_returns(returns_test, 1.0);
    let paths = cumulative_paths(preds, 1.0);
    let ranks: Vec<f64> = (0..paths.ncols())
        .into_par_iter()
        .map(|j| {
            let col = paths.column(j).to_vec();
            percentile_of_score_weak(&col, realized[j])
        })
        .collect();
    let mean_rank = ranks.iter().sum::<f64>() / ranks.len() as f64;
    Ok(100.0 - (50.0 - mean_rank).abs() / 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn cumulative_paths_compound_rows() {
        let preds = array![[0.1, 0.1], [0.0, -0.5]];
        let paths = cumulative_paths(preds.view(), 2.0);
        assert!((paths[[0, 0]] - 2.2).abs() < 1e-12);
        assert!((paths[[0, 1]] - 2.42).abs() < 1e-12);
        assert!((paths[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bands_interpolate_linearly() {
        // Single step; cumulative values 1.0..=1.4 across five draws.
        let preds = array![[0.0], [0.1], [0.2], [0.3], [0.4]];
        let cone = compute_bayes_cone(preds.view(), 1.0).unwrap();
        assert_eq!(cone.len(), 1);
        assert!((cone.band(5).unwrap()[0] - 1.02).abs() < 1e-12);
        assert!((cone.band(25).unwrap()[0] - 1.1).abs() < 1e-12);
        assert!((cone.band(75).unwrap()[0] - 1.3).abs() < 1e-12);
        assert!((cone.band(95).unwrap()[0] - 1.38).abs() < 1e-12);
        assert_eq!(cone.levels().collect::<Vec<_>>(), vec![5, 25, 75, 95]);
    }

    #[test]
    fn identical_simulations_collapse_bands() {
        let preds = Array2::from_elem((4, 3), 0.01);
        let cone = compute_bayes_cone(preds.view(), 1.0).unwrap();
        for level in CONE_LEVELS {
            let band = cone.band(level).unwrap();
            assert!((band[2] - 1.01f64.powi(3)).abs() < 1e-12);
        }
    }

    #[test]
    fn realized_above_everything_scores_zero() {
        let preds = Array2::zeros((10, 4));
        let score = compute_consistency_score(&[0.5; 4], preds.view()).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn realized_below_everything_scores_zero() {
        let preds = Array2::zeros((10, 4));
        let score = compute_consistency_score(&[-0.5; 4], preds.view()).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn empty_and_mismatched_inputs_are_errors() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            compute_bayes_cone(empty.view(), 1.0),
            Err(ConeError::Empty { .. })
        ));
        let preds = Array2::zeros((5, 3));
        assert_eq!(
            compute_consistency_score(&[0.0; 2], preds.view()),
            Err(ConeError::LengthMismatch {
                realized: 2,
                steps: 3
            })
        );
    }

    #[test]
    fn nan_simulations_are_rejected() {
        let preds = Array2::from_shape_fn((64, 1), |(i, _)| {
            if i % 3 == 0 {
                f64::NAN
            } else {
                0.001 * i as f64
            }
        });
        assert_eq!(
            compute_bayes_cone(preds.view(), 1.0),
            Err(ConeError::NonFinite { draw: 0, step: 0 })
        );
        assert_eq!(
            compute_consistency_score(&[0.0], preds.view()),
            Err(ConeError::NonFinite { draw: 0, step: 0 })
        );
        let mut inf = Array2::zeros((70, 2));
        inf[[5, 1]] = f64::INFINITY;
        assert_eq!(
            compute_bayes_cone(inf.view(), 1.0),
            Err(ConeError::NonFinite { draw: 5, step: 1 })
        );
    }

    #[test]
    fn index_must_match_steps() {
        let preds = Array2::zeros((5, 2));
        let cone = compute_bayes_cone(preds.view(), 1.0).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(cone.clone().with_index(vec![d]).is_err());
        let dated = cone.with_index(vec![d, d.succ_opt().unwrap()]).unwrap();
        assert_eq!(dated.index().unwrap().len(), 2);
    }
}

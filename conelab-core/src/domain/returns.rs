//! ReturnSeries: dated simple returns, the input unit of every model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from constructing a return series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("dates and values differ in length: {dates} dates, {values} values")]
    LengthMismatch { dates: usize, values: usize },
    #[error("dates must be strictly increasing: {prev} is followed by {next}")]
    NotChronological { prev: NaiveDate, next: NaiveDate },
    #[error("non-finite return {value} on {date}")]
    NonFinite { date: NaiveDate, value: f64 },
}

/// Chronological sequence of `(date, simple return)` observations.
///
/// Dates are strictly increasing (no duplicates) and every value is finite.
/// The series is immutable once built; models copy values into their own
/// data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, SeriesError> {
        if dates.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                dates: dates.len(),
                values: values.len(),
            });
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SeriesError::NotChronological {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        if let Some((date, value)) = dates
            .iter()
            .zip(values.iter())
            .find(|(_, v)| !v.is_finite())
        {
            return Err(SeriesError::NonFinite {
                date: *date,
                value: *value,
            });
        }
        Ok(Self { dates, values })
    }

    /// Build from `(date, return)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let (dates, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::new(dates, values)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Value on `date`, if observed.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }

    /// Values re-indexed onto `index`; dates absent from this series become NaN.
    ///
    /// NaN is the missing-observation marker understood by every model.
    pub fn align_to(&self, index: &[NaiveDate]) -> Vec<f64> {
        index
            .iter()
            .map(|d| self.get(*d).unwrap_or(f64::NAN))
            .collect()
    }

    /// The sub-series with dates on or after `start`.
    pub fn since(&self, start: NaiveDate) -> ReturnSeries {
        let from = self.dates.partition_point(|d| *d < start);
        ReturnSeries {
            dates: self.dates[from..].to_vec(),
            values: self.values[from..].to_vec(),
        }
    }

    /// The last `n` observations (all of them when `n >= len`).
    pub fn tail(&self, n: usize) -> ReturnSeries {
        let from = self.len().saturating_sub(n);
        ReturnSeries {
            dates: self.dates[from..].to_vec(),
            values: self.values[from..].to_vec(),
        }
    }

    /// Cumulative wealth path: `starting_value * prod(1 + r)` up to each date.
    pub fn cum_returns(&self, starting_value: f64) -> Vec<f64> {
        cum_returns(&self.values, starting_value)
    }
}

/// Compound simple returns into a cumulative path starting from `starting_value`.
///
/// The first element is `starting_value * (1 + r[0])`; the starting value
/// itself is not included.
pub fn cum_returns(returns: &[f64], starting_value: f64) -> Vec<f64> {
    returns
        .iter()
        .scan(starting_value, |acc, r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn rejects_unsorted_dates() {
        let err = ReturnSeries::new(vec![d(2), d(1)], vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, SeriesError::NotChronological { .. }));
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = ReturnSeries::new(vec![d(2), d(2)], vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, SeriesError::NotChronological { .. }));
    }

    #[test]
    fn rejects_nan_values() {
        let err = ReturnSeries::new(vec![d(1), d(2)], vec![0.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, SeriesError::NonFinite { .. }));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = ReturnSeries::new(vec![d(1)], vec![0.0, 0.1]).unwrap_err();
        assert_eq!(err, SeriesError::LengthMismatch { dates: 1, values: 2 });
    }

    #[test]
    fn align_marks_absent_dates_missing() {
        let s = ReturnSeries::new(vec![d(1), d(3)], vec![0.01, 0.03]).unwrap();
        let aligned = s.align_to(&[d(1), d(2), d(3), d(4)]);
        assert_eq!(aligned[0], 0.01);
        assert!(aligned[1].is_nan());
        assert_eq!(aligned[2], 0.03);
        assert!(aligned[3].is_nan());
    }

    #[test]
    fn cum_returns_compounds() {
        let path = cum_returns(&[0.1, -0.1, 0.0], 1.0);
        assert!((path[0] - 1.1).abs() < 1e-12);
        assert!((path[1] - 0.99).abs() < 1e-12);
        assert!((path[2] - 0.99).abs() < 1e-12);
    }

    #[test]
    fn since_and_tail_slice_by_date_and_count() {
        let s = ReturnSeries::new(vec![d(1), d(2), d(3)], vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(s.since(d(2)).values(), &[0.2, 0.3]);
        assert_eq!(s.tail(1).dates(), &[d(3)]);
        assert_eq!(s.tail(10).len(), 3);
    }
}

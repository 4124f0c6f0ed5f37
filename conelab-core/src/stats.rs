//! Descriptive statistics shared by model builders and cone analytics.
//!
//! Conventions follow the numerical Python stack the models were calibrated
//! against: `std` is the population standard deviation (ddof = 0), and
//! percentiles use linear interpolation between order statistics.
//! NaN entries are treated as missing and skipped by the `_observed` helpers.

/// Iterator over the finite (observed) entries of `values`.
pub fn observed(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0). NaN for an empty slice.
pub fn std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Mean over non-missing entries.
pub fn mean_observed(values: &[f64]) -> f64 {
    let obs: Vec<f64> = observed(values).collect();
    mean(&obs)
}

/// Population std over non-missing entries.
pub fn std_observed(values: &[f64]) -> f64 {
    let obs: Vec<f64> = observed(values).collect();
    std(&obs)
}

/// Ordinary least squares fit `y = intercept + slope * x` over pairs where
/// `y` is observed. Returns `(slope, intercept)`, or `None` when fewer than
/// two pairs remain or `x` has no variance.
pub fn linregress(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(xi, yi)| !yi.is_nan() && !xi.is_nan())
        .map(|(&xi, &yi)| (xi, yi))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = pairs.iter().map(|p| (p.0 - mx).powi(2)).sum();
    let sxy: f64 = pairs.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    if sxx < 1e-300 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, my - slope * mx))
}

/// Percentile of a sorted slice using linear interpolation.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Score at percentile `p` (0..=100) of an unsorted sample.
pub fn score_at_percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sort_floats(&mut sorted);
    percentile_sorted(&sorted, p)
}

/// Weak percentile rank of `score` within `values`: the percentage of
/// values less than or equal to `score`.
pub fn percentile_of_score_weak(values: &[f64], score: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let at_or_below = values.iter().filter(|&&v| v <= score).count();
    100.0 * at_or_below as f64 / values.len() as f64
}

/// Sort floats ascending by IEEE total order; NaNs go to the end.
pub fn sort_floats(values: &mut [f64]) {
    values.sort_by(f64::total_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_with_nans_is_total() {
        let mut values: Vec<f64> = (0..96)
            .map(|i| if i % 3 == 0 { f64::NAN } else { f64::from(96 - i) })
            .collect();
        sort_floats(&mut values);
        let finite: Vec<f64> = values.iter().copied().take_while(|v| !v.is_nan()).collect();
        assert_eq!(finite.len(), 64);
        assert!(finite.windows(2).all(|w| w[0] <= w[1]));
        assert!(values[64..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn std_is_population_std() {
        // numpy.std([1, 2, 3, 4]) == 1.118033988749895
        assert!((std(&[1.0, 2.0, 3.0, 4.0]) - 1.118033988749895).abs() < 1e-12);
    }

    #[test]
    fn observed_helpers_skip_nan() {
        let v = [1.0, f64::NAN, 3.0];
        assert_eq!(mean_observed(&v), 2.0);
        assert_eq!(std_observed(&v), 1.0);
    }

    #[test]
    fn percentile_matches_linear_rule() {
        // numpy.percentile([1, 2, 3, 4], 25) == 1.75
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile_sorted(&sorted, 25.0) - 1.75).abs() < 1e-12);
        assert!((percentile_sorted(&sorted, 95.0) - 3.85).abs() < 1e-12);
        assert_eq!(percentile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(percentile_sorted(&sorted, 100.0), 4.0);
    }

    #[test]
    fn score_at_percentile_sorts_first() {
        assert!((score_at_percentile(&[4.0, 1.0, 3.0, 2.0], 50.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn weak_rank_counts_ties_in_favor() {
        // scipy.stats.percentileofscore([1, 2, 3, 4], 3, kind='weak') == 75.0
        assert_eq!(percentile_of_score_weak(&[1.0, 2.0, 3.0, 4.0], 3.0), 75.0);
        assert_eq!(percentile_of_score_weak(&[1.0, 2.0, 3.0, 4.0], 0.0), 0.0);
        assert_eq!(percentile_of_score_weak(&[1.0, 2.0, 3.0, 4.0], 9.0), 100.0);
    }

    #[test]
    fn linregress_recovers_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, f64::NAN, 7.0];
        let (slope, intercept) = linregress(&x, &y).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
    }

    #[test]
    fn linregress_needs_variance() {
        assert!(linregress(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0]).is_none());
    }
}

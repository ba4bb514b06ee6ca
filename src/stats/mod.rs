//! Statistics and correlation engine
//!
//! Read-only computations over the current [`Dataset`](crate::data::Dataset):
//! per-column descriptive statistics and pairwise correlation matrices.

mod correlation;
mod summary;

pub use correlation::{
    average_ranks, correlate, kendall_tau_b, pearson, spearman, strength_label, CorrelationMethod,
    CorrelationPair, CorrelationResult,
};
pub use summary::{
    categorical_stats, column_stats, numeric_stats, summarize, BriefStats, CategoricalStats,
    ColumnStats, Frequency, NumericStats, Summary,
};

use std::cmp::Ordering;

/// Arithmetic mean, `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Variance with `ddof` delta degrees of freedom
pub fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    let n = values.len();
    if n <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (n - ddof) as f64)
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    variance(values, 1).map(f64::sqrt)
}

/// Population standard deviation (n denominator)
pub fn population_std(values: &[f64]) -> Option<f64> {
    variance(values, 0).map(f64::sqrt)
}

pub fn sort_floats(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Quantile of already sorted data, linear interpolation between
/// closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Quantile of unsorted data
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sort_floats(&mut sorted);
    quantile_sorted(&sorted, q)
}

/// Adjusted Fisher-Pearson skewness
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let m = mean(values)?;
    let s = sample_std(values)?;
    if s == 0.0 {
        return Some(0.0);
    }
    let nf = n as f64;
    let cubed: f64 = values.iter().map(|v| ((v - m) / s).powi(3)).sum();
    Some(nf / ((nf - 1.0) * (nf - 2.0)) * cubed)
}

/// Present values of an optional series
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

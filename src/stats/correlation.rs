//! Pairwise correlation: Pearson, Spearman and Kendall tau-b

use crate::data::Dataset;
use crate::error::{QuantError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub const ALL: [&'static str; 3] = ["pearson", "spearman", "kendall"];

    pub fn compute(&self, x: &[f64], y: &[f64]) -> Option<f64> {
        match self {
            CorrelationMethod::Pearson => pearson(x, y),
            CorrelationMethod::Spearman => spearman(x, y),
            CorrelationMethod::Kendall => kendall_tau_b(x, y),
        }
    }
}

impl FromStr for CorrelationMethod {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            "kendall" => Ok(CorrelationMethod::Kendall),
            other => Err(QuantError::InvalidParams(format!(
                "unknown correlation method '{}', expected one of {}",
                other,
                Self::ALL.join(", ")
            ))),
        }
    }
}

/// One unordered column pair
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationPair {
    pub column_a: String,
    pub column_b: String,
    pub correlation: Option<f64>,
    pub strength: Option<&'static str>,
    pub observations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationResult {
    pub method: CorrelationMethod,
    pub columns: Vec<String>,
    pub matrix: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    pub pairs: Vec<CorrelationPair>,
}

/// Correlate numeric columns. Missing values are dropped pairwise.
pub fn correlate(
    dataset: &Dataset,
    columns: Option<&[String]>,
    method: CorrelationMethod,
) -> Result<CorrelationResult> {
    let columns: Vec<String> = match columns {
        Some(cols) if !cols.is_empty() => cols.to_vec(),
        _ => dataset.numeric_columns(),
    };

    let mut seen = HashSet::new();
    if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(QuantError::InvalidParams(format!("column '{}' listed twice", dup)));
    }
    dataset.require_numeric(&columns)?;
    if columns.len() < 2 {
        return Err(QuantError::InvalidParams(format!(
            "correlation needs at least 2 numeric columns, got {}",
            columns.len()
        )));
    }

    let values: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|c| dataset.numeric(c))
        .collect::<Result<_>>()?;

    let index_pairs: Vec<(usize, usize)> = (0..columns.len())
        .flat_map(|i| (i + 1..columns.len()).map(move |j| (i, j)))
        .collect();

    let pairs: Vec<CorrelationPair> = index_pairs
        .par_iter()
        .map(|&(i, j)| {
            let (x, y): (Vec<f64>, Vec<f64>) = values[i]
                .iter()
                .zip(&values[j])
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .unzip();
            let correlation = method.compute(&x, &y);
            CorrelationPair {
                column_a: columns[i].clone(),
                column_b: columns[j].clone(),
                correlation,
                strength: correlation.map(strength_label),
                observations: x.len(),
            }
        })
        .collect();

    let mut matrix: BTreeMap<String, BTreeMap<String, Option<f64>>> = columns
        .iter()
        .map(|c| (c.clone(), BTreeMap::from([(c.clone(), Some(1.0))])))
        .collect();
    for pair in &pairs {
        for (a, b) in [(&pair.column_a, &pair.column_b), (&pair.column_b, &pair.column_a)] {
            if let Some(row) = matrix.get_mut(a) {
                row.insert(b.clone(), pair.correlation);
            }
        }
    }

    Ok(CorrelationResult {
        method,
        columns,
        matrix,
        pairs,
    })
}

/// Verbal strength of a coefficient by absolute value
pub fn strength_label(r: f64) -> &'static str {
    match r.abs() {
        a if a >= 0.8 => "very strong",
        a if a >= 0.6 => "strong",
        a if a >= 0.4 => "moderate",
        a if a >= 0.2 => "weak",
        _ => "very weak",
    }
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some((sxy / denom).clamp(-1.0, 1.0))
}

/// 1-based ranks, ties get the average of their positions
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    pearson(&average_ranks(&x[..n]), &average_ranks(&y[..n]))
}

/// Kendall tau-b in O(n log n) (Knight's algorithm)
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mut pairs: Vec<(f64, f64)> = x[..n].iter().copied().zip(y[..n].iter().copied()).collect();
    pairs.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
    });

    let total = (n * (n - 1) / 2) as f64;
    let x_ties = tied_pairs(&pairs, |a, b| a.0 == b.0);
    let joint_ties = tied_pairs(&pairs, |a, b| a.0 == b.0 && a.1 == b.1);

    let mut ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let mut buffer = vec![0.0; n];
    let swaps = merge_count(&mut ys, &mut buffer) as f64;
    let y_ties = {
        let sorted: Vec<(f64, f64)> = ys.iter().map(|&v| (v, v)).collect();
        tied_pairs(&sorted, |a, b| a.0 == b.0)
    };

    let denom = ((total - x_ties) * (total - y_ties)).sqrt();
    if denom == 0.0 {
        return None;
    }
    let numer = total - x_ties - y_ties + joint_ties - 2.0 * swaps;
    Some((numer / denom).clamp(-1.0, 1.0))
}

/// Number of tied pairs across runs of equal adjacent items
fn tied_pairs(sorted: &[(f64, f64)], same: impl Fn(&(f64, f64), &(f64, f64)) -> bool) -> f64 {
    let mut total = 0.0;
    let mut run = 1usize;
    for w in sorted.windows(2) {
        if same(&w[0], &w[1]) {
            run += 1;
        } else {
            total += (run * (run - 1) / 2) as f64;
            run = 1;
        }
    }
    total + (run * (run - 1) / 2) as f64
}

/// Merge sort that returns the number of strict inversions
fn merge_count(values: &mut [f64], buffer: &mut [f64]) -> u64 {
    let n = values.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut swaps = {
        let (left, right) = values.split_at_mut(mid);
        let (lb, rb) = buffer.split_at_mut(mid);
        merge_count(left, lb) + merge_count(right, rb)
    };

    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < n {
        if values[i] <= values[j] {
            buffer[k] = values[i];
            i += 1;
        } else {
            buffer[k] = values[j];
            swaps += (mid - i) as u64;
            j += 1;
        }
        k += 1;
    }
    buffer[k..k + mid - i].copy_from_slice(&values[i..mid]);
    k += mid - i;
    buffer[k..k + n - j].copy_from_slice(&values[j..n]);
    values.copy_from_slice(&buffer[..n]);
    swaps
}

//! Per-column descriptive statistics

use super::{mean, present, quantile_sorted, sample_std, skewness, sort_floats};
use crate::data::{ColumnKind, Dataset};
use crate::error::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Statistics for a numeric column
#[derive(Debug, Clone, Serialize)]
pub struct NumericStats {
    pub count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub sum: f64,
    pub skewness: Option<f64>,
}

/// One entry of a frequency table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Frequency {
    pub value: String,
    pub count: usize,
}

/// Statistics for a categorical or datetime column
#[derive(Debug, Clone, Serialize)]
pub struct CategoricalStats {
    pub kind: ColumnKind,
    pub count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub most_frequent: Option<String>,
    pub most_frequent_share: Option<f64>,
    pub frequencies: Vec<Frequency>,
}

/// Statistics for any single column
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

/// Result of a statistics request
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub row_count: usize,
    pub numeric_stats: BTreeMap<String, NumericStats>,
    pub categorical_stats: BTreeMap<String, CategoricalStats>,
}

/// Compact numeric summary reported around a transform
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BriefStats {
    pub count: usize,
    pub null_count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl BriefStats {
    pub fn from_values(values: &[Option<f64>]) -> Self {
        let data = present(values);
        Self {
            count: data.len(),
            null_count: values.len() - data.len(),
            mean: mean(&data),
            std: sample_std(&data),
            min: data.iter().copied().reduce(f64::min),
            max: data.iter().copied().reduce(f64::max),
        }
    }
}

pub fn numeric_stats(values: &[Option<f64>]) -> NumericStats {
    let mut data = present(values);
    let distinct: HashSet<u64> = data.iter().map(|v| (v + 0.0).to_bits()).collect();
    let m = mean(&data);
    let std = sample_std(&data);
    let skew = skewness(&data);
    let sum = data.iter().sum();
    sort_floats(&mut data);

    NumericStats {
        count: data.len(),
        null_count: values.len() - data.len(),
        distinct_count: distinct.len(),
        mean: m,
        median: quantile_sorted(&data, 0.5),
        std,
        min: data.first().copied(),
        max: data.last().copied(),
        q1: quantile_sorted(&data, 0.25),
        q3: quantile_sorted(&data, 0.75),
        sum,
        skewness: skew,
    }
}

pub fn categorical_stats(kind: ColumnKind, values: &[Option<String>]) -> CategoricalStats {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values.iter().flatten() {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    let count: usize = counts.values().sum();

    let mut frequencies: Vec<Frequency> = counts
        .into_iter()
        .map(|(value, count)| Frequency {
            value: value.to_string(),
            count,
        })
        .collect();
    frequencies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

    let top = frequencies.first();
    CategoricalStats {
        kind,
        count,
        null_count: values.len() - count,
        distinct_count: frequencies.len(),
        most_frequent: top.map(|f| f.value.clone()),
        most_frequent_share: top.map(|f| f.count as f64 / count as f64),
        frequencies,
    }
}

/// Statistics for one column of the dataset
pub fn column_stats(dataset: &Dataset, column: &str) -> Result<ColumnStats> {
    dataset.require_columns(&[column])?;
    match dataset.kind(column) {
        Some(ColumnKind::Numeric) => Ok(ColumnStats::Numeric(numeric_stats(&dataset.numeric(column)?))),
        Some(kind) => Ok(ColumnStats::Categorical(categorical_stats(kind, &dataset.text(column)?))),
        None => Err(crate::error::QuantError::ColumnNotFound(vec![column.to_string()])),
    }
}

/// Statistics for the requested columns, or all columns when none given
pub fn summarize(dataset: &Dataset, columns: Option<&[String]>) -> Result<Summary> {
    let columns: Vec<String> = match columns {
        Some(cols) if !cols.is_empty() => {
            dataset.require_columns(cols)?;
            cols.to_vec()
        }
        _ => dataset.headers(),
    };

    let mut numeric = BTreeMap::new();
    let mut categorical = BTreeMap::new();
    for name in columns {
        match column_stats(dataset, &name)? {
            ColumnStats::Numeric(s) => {
                numeric.insert(name, s);
            }
            ColumnStats::Categorical(s) => {
                categorical.insert(name, s);
            }
        }
    }

    Ok(Summary {
        row_count: dataset.height(),
        numeric_stats: numeric,
        categorical_stats: categorical,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_stats_with_missing() {
        let values = vec![Some(1.0), Some(2.0), None, Some(3.0), Some(4.0), Some(4.0)];
        let s = numeric_stats(&values);
        assert_eq!(s.count, 5);
        assert_eq!(s.null_count, 1);
        assert_eq!(s.distinct_count, 4);
        assert_eq!(s.median, Some(3.0));
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(4.0));
        assert_eq!(s.q1, Some(2.0));
        assert_eq!(s.q3, Some(4.0));
        assert!((s.mean.unwrap() - 2.8).abs() < 1e-12);
        assert!((s.sum - 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_stats_frequency_order() {
        let values: Vec<Option<String>> = ["b", "a", "b", "c", "a", "b"]
            .iter()
            .map(|s| Some(s.to_string()))
            .chain(std::iter::once(None))
            .collect();
        let s = categorical_stats(ColumnKind::Categorical, &values);
        assert_eq!(s.count, 6);
        assert_eq!(s.null_count, 1);
        assert_eq!(s.distinct_count, 3);
        assert_eq!(s.most_frequent.as_deref(), Some("b"));
        assert!((s.most_frequent_share.unwrap() - 0.5).abs() < 1e-12);
        let order: Vec<&str> = s.frequencies.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_categorical_has_no_mode() {
        let s = categorical_stats(ColumnKind::Categorical, &[None, None]);
        assert_eq!(s.count, 0);
        assert!(s.most_frequent.is_none());
        assert!(s.most_frequent_share.is_none());
    }

    #[test]
    fn test_brief_stats() {
        let b = BriefStats::from_values(&[Some(2.0), None, Some(4.0)]);
        assert_eq!(b.count, 2);
        assert_eq!(b.null_count, 1);
        assert_eq!(b.mean, Some(3.0));
        assert_eq!(b.min, Some(2.0));
        assert_eq!(b.max, Some(4.0));
    }
}

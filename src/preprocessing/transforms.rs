//! Log transform, binning and one-hot encoding

use crate::data::format_number;
use crate::error::{QuantError, Result};
use crate::stats::{present, quantile_sorted, sort_floats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Natural log with a shift when the column has non-positive values
#[derive(Debug, Clone, Copy)]
pub struct LogTransform {
    offset: f64,
}

impl LogTransform {
    pub fn new(offset: f64) -> Result<Self> {
        if !(offset.is_finite() && offset > 0.0) {
            return Err(QuantError::InvalidParams(format!(
                "log offset must be a positive number, got {}",
                offset
            )));
        }
        Ok(Self { offset })
    }

    /// Shift added before taking the log, zero when every value is positive
    pub fn shift_for(&self, values: &[Option<f64>]) -> f64 {
        match present(values).into_iter().reduce(f64::min) {
            Some(min) if min <= 0.0 => min.abs() + self.offset,
            _ => 0.0,
        }
    }

    pub fn apply(&self, values: &[Option<f64>]) -> (Vec<Option<f64>>, f64) {
        let shift = self.shift_for(values);
        let out = values.iter().map(|v| v.map(|x| (x + shift).ln())).collect();
        (out, shift)
    }
}

/// Binning strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningStrategy {
    /// Equal-width bins
    #[default]
    Uniform,
    /// Equal-frequency bins (quantiles)
    Quantile,
}

/// Feature binner/discretizer producing interval labels
#[derive(Debug, Clone)]
pub struct Binner {
    strategy: BinningStrategy,
    n_bins: usize,
    edges: Vec<f64>,
}

impl Binner {
    pub const MAX_BINS: usize = 1000;

    pub fn new(strategy: BinningStrategy, n_bins: usize) -> Result<Self> {
        if n_bins == 0 || n_bins > Self::MAX_BINS {
            return Err(QuantError::InvalidParams(format!(
                "bins must be between 1 and {}, got {}",
                Self::MAX_BINS,
                n_bins
            )));
        }
        Ok(Self {
            strategy,
            n_bins,
            edges: Vec::new(),
        })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn fit(&mut self, values: &[Option<f64>]) -> Result<&mut Self> {
        let mut data = present(values);
        if data.is_empty() {
            return Err(QuantError::insufficient("binning", 1, 0));
        }
        sort_floats(&mut data);
        let min = data[0];
        let max = data[data.len() - 1];

        let mut edges: Vec<f64> = match self.strategy {
            BinningStrategy::Uniform => {
                let step = (max - min) / self.n_bins as f64;
                (0..=self.n_bins).map(|i| min + i as f64 * step).collect()
            }
            BinningStrategy::Quantile => (0..=self.n_bins)
                .filter_map(|i| quantile_sorted(&data, i as f64 / self.n_bins as f64))
                .collect(),
        };
        if let Some(last) = edges.last_mut() {
            *last = max;
        }
        edges.dedup();
        if edges.len() < 2 {
            edges = vec![min, max];
        }
        self.edges = edges;
        Ok(self)
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Bin index of a value; the first bin is closed on the left
    pub fn find_bin(&self, value: f64) -> usize {
        let upper = &self.edges[1..];
        upper
            .partition_point(|&e| e < value)
            .min(self.n_bins().saturating_sub(1))
    }

    pub fn labels(&self) -> Vec<String> {
        self.edges
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let open = if i == 0 { '[' } else { '(' };
                format!("{}{}, {}]", open, format_edge(w[0]), format_edge(w[1]))
            })
            .collect()
    }

    pub fn transform(&self, values: &[Option<f64>]) -> Vec<Option<String>> {
        let labels = self.labels();
        values
            .iter()
            .map(|v| v.map(|x| labels[self.find_bin(x)].clone()))
            .collect()
    }
}

fn format_edge(v: f64) -> String {
    if v.fract() == 0.0 {
        format_number(v)
    } else {
        let s = format!("{:.4}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// One indicator column per distinct value, in sorted order
#[derive(Debug, Clone)]
pub struct OneHotEncoder {
    categories: Vec<String>,
}

impl OneHotEncoder {
    /// Numeric columns with at least this many distinct values are rejected
    pub const MAX_NUMERIC_LEVELS: usize = 10;

    pub fn fit_text(keys: &[Option<String>]) -> Self {
        let categories: BTreeSet<&String> = keys.iter().flatten().collect();
        Self {
            categories: categories.into_iter().cloned().collect(),
        }
    }

    pub fn fit_numeric(values: &[Option<f64>]) -> Self {
        let mut data = present(values);
        sort_floats(&mut data);
        data.dedup();
        Self {
            categories: data.into_iter().map(format_number).collect(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Indicator vectors keyed by category; missing keys encode as all zeros
    pub fn transform(&self, keys: &[Option<String>]) -> Vec<(String, Vec<Option<f64>>)> {
        self.categories
            .iter()
            .map(|cat| {
                let indicator = keys
                    .iter()
                    .map(|k| Some(if k.as_ref() == Some(cat) { 1.0 } else { 0.0 }))
                    .collect();
                (cat.clone(), indicator)
            })
            .collect()
    }
}

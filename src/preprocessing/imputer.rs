//! Missing value imputation

use crate::data::format_number;
use crate::error::{QuantError, Result};
use crate::stats::{mean, present, quantile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strategy for filling missing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Mode,
    Constant,
}

impl ImputeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImputeStrategy::Mean => "mean",
            ImputeStrategy::Median => "median",
            ImputeStrategy::Mode => "mode",
            ImputeStrategy::Constant => "constant",
        }
    }
}

/// Fill value for a numeric column
pub fn numeric_fill_value(
    strategy: ImputeStrategy,
    values: &[Option<f64>],
    constant: Option<&serde_json::Value>,
) -> Result<f64> {
    let data = present(values);
    let fill = match strategy {
        ImputeStrategy::Mean => mean(&data),
        ImputeStrategy::Median => quantile(&data, 0.5),
        ImputeStrategy::Mode => numeric_mode(&data),
        ImputeStrategy::Constant => {
            let value = constant.ok_or_else(|| {
                QuantError::InvalidParams("fillna with method 'constant' requires 'value'".to_string())
            })?;
            let number = match value {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => crate::data::parse_number(s),
                _ => None,
            };
            return number.ok_or_else(|| {
                QuantError::InvalidParams(format!(
                    "constant fill value for a numeric column must be a number, got {}",
                    value
                ))
            });
        }
    };
    fill.ok_or_else(|| QuantError::insufficient("fillna", 1, 0))
}

/// Fill value for a categorical or datetime column
pub fn text_fill_value(
    strategy: ImputeStrategy,
    values: &[Option<String>],
    constant: Option<&serde_json::Value>,
) -> Result<String> {
    match strategy {
        ImputeStrategy::Mode => text_mode(values).ok_or_else(|| QuantError::insufficient("fillna", 1, 0)),
        ImputeStrategy::Constant => match constant {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(serde_json::Value::Number(n)) => Ok(n
                .as_f64()
                .map(format_number)
                .unwrap_or_else(|| n.to_string())),
            Some(serde_json::Value::Bool(b)) => Ok(b.to_string()),
            Some(other) => Err(QuantError::InvalidParams(format!(
                "constant fill value must be a scalar, got {}",
                other
            ))),
            None => Err(QuantError::InvalidParams(
                "fillna with method 'constant' requires 'value'".to_string(),
            )),
        },
        ImputeStrategy::Mean | ImputeStrategy::Median => Err(QuantError::InvalidParams(format!(
            "fillna method '{}' needs a numeric column",
            strategy.as_str()
        ))),
    }
}

pub fn fill_numeric(values: &[Option<f64>], fill: f64) -> (Vec<Option<f64>>, usize) {
    let filled = values.iter().filter(|v| v.is_none()).count();
    (values.iter().map(|v| Some(v.unwrap_or(fill))).collect(), filled)
}

pub fn fill_text(values: &[Option<String>], fill: &str) -> (Vec<Option<String>>, usize) {
    let filled = values.iter().filter(|v| v.is_none()).count();
    let out = values
        .iter()
        .map(|v| Some(v.clone().unwrap_or_else(|| fill.to_string())))
        .collect();
    (out, filled)
}

/// Most frequent value; ties resolve to the smallest
fn numeric_mode(data: &[f64]) -> Option<f64> {
    let mut counts: HashMap<u64, (f64, usize)> = HashMap::new();
    for &v in data {
        counts.entry((v + 0.0).to_bits()).or_insert((v, 0)).1 += 1;
    }
    counts
        .into_values()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)))
        .map(|(v, _)| v)
}

/// Most frequent value; ties resolve to the lexicographically smallest
fn text_mode(values: &[Option<String>]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values.iter().flatten() {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(v, _)| v.to_string())
}

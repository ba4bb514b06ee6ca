//! Transform engine
//!
//! Applies one named transformation to one column of the session dataset.
//! Requests are parsed into a closed [`TransformSpec`] before anything is
//! touched; the new column set is computed on the side and committed in a
//! single step together with the updated column kinds.

mod imputer;
mod scaler;
pub mod transforms;

pub use imputer::{fill_numeric, fill_text, numeric_fill_value, text_fill_value, ImputeStrategy};
pub use scaler::{Scaler, ScalerParams, ScalerType, StandardScaler};
pub use transforms::{Binner, BinningStrategy, LogTransform, OneHotEncoder};

use crate::data::{numeric_column, text_column, ColumnKind, Dataset};
use crate::error::{QuantError, Result};
use crate::stats::BriefStats;
use polars::prelude::Column;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleParams {
    pub feature_range: [f64; 2],
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            feature_range: [0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogParams {
    pub offset: f64,
}

impl Default for LogParams {
    fn default() -> Self {
        Self { offset: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinningParams {
    #[serde(alias = "n_bins")]
    pub bins: usize,
    pub strategy: BinningStrategy,
}

impl Default for BinningParams {
    fn default() -> Self {
        Self {
            bins: 5,
            strategy: BinningStrategy::Uniform,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FillNaParams {
    /// Defaults to mean for numeric columns and mode otherwise
    pub method: Option<ImputeStrategy>,
    pub value: Option<serde_json::Value>,
}

/// A parsed transformation request
#[derive(Debug, Clone, PartialEq)]
pub enum TransformSpec {
    Normalize,
    Scale(ScaleParams),
    Log(LogParams),
    OneHotEncode,
    Binning(BinningParams),
    FillNa(FillNaParams),
}

impl TransformSpec {
    pub const SUPPORTED: [&'static str; 6] =
        ["normalize", "scale", "log", "one_hot_encode", "binning", "fillna"];

    /// Parse an identifier and its parameters
    pub fn parse(name: &str, params: Option<serde_json::Value>) -> Result<Self> {
        let spec = match name.trim().to_ascii_lowercase().as_str() {
            "normalize" | "standardize" | "zscore" => {
                parse_params::<NoParams>(params)?;
                TransformSpec::Normalize
            }
            "scale" | "minmax" | "min_max" => TransformSpec::Scale(parse_params(params)?),
            "log" => TransformSpec::Log(parse_params(params)?),
            "one_hot_encode" | "one_hot" | "onehot" => {
                parse_params::<NoParams>(params)?;
                TransformSpec::OneHotEncode
            }
            "binning" | "bin" => TransformSpec::Binning(parse_params(params)?),
            "fillna" | "fill_na" => TransformSpec::FillNa(parse_params(params)?),
            other => return Err(QuantError::UnsupportedTransform(other.to_string())),
        };
        Ok(spec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformSpec::Normalize => "normalize",
            TransformSpec::Scale(_) => "scale",
            TransformSpec::Log(_) => "log",
            TransformSpec::OneHotEncode => "one_hot_encode",
            TransformSpec::Binning(_) => "binning",
            TransformSpec::FillNa(_) => "fillna",
        }
    }
}

fn parse_params<T: DeserializeOwned + Default>(params: Option<serde_json::Value>) -> Result<T> {
    match params {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| QuantError::InvalidParams(e.to_string())),
    }
}

/// What a committed transform did
#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    pub column: String,
    pub transformation: &'static str,
    pub before: Option<BriefStats>,
    pub after: Option<BriefStats>,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
    pub detail: serde_json::Value,
}

/// Column-level edit computed before the commit
enum Edit {
    Replace(Column, ColumnKind),
    Expand(Vec<(Column, ColumnKind)>),
    InsertAfter(Column, ColumnKind),
}

/// Apply a transformation to `column`. On error the dataset is unchanged.
pub fn apply(dataset: &mut Dataset, column: &str, spec: &TransformSpec) -> Result<TransformSummary> {
    dataset.require_columns(&[column])?;
    let kind = dataset
        .kind(column)
        .ok_or_else(|| QuantError::ColumnNotFound(vec![column.to_string()]))?;
    let position = dataset
        .position(column)
        .ok_or_else(|| QuantError::ColumnNotFound(vec![column.to_string()]))?;

    let before = match kind {
        ColumnKind::Numeric => Some(BriefStats::from_values(&dataset.numeric(column)?)),
        _ => None,
    };

    let (edit, detail) = plan(dataset, column, kind, spec)?;

    let mut columns = dataset.columns();
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let result_column = match edit {
        Edit::Replace(col, new_kind) => {
            columns[position] = (col, new_kind);
            Some(column.to_string())
        }
        Edit::Expand(new_cols) => {
            removed.push(column.to_string());
            added.extend(new_cols.iter().map(|(c, _)| c.name().to_string()));
            let _replaced: Vec<_> = columns.splice(position..=position, new_cols).collect();
            None
        }
        Edit::InsertAfter(col, new_kind) => {
            added.push(col.name().to_string());
            columns.insert(position + 1, (col, new_kind));
            Some(column.to_string())
        }
    };

    if let Some(clash) = added.iter().find(|name| dataset.has_column(name)) {
        return Err(QuantError::InvalidParams(format!(
            "transform would create column '{}' which already exists",
            clash
        )));
    }

    dataset.commit(columns)?;

    let after = match result_column {
        Some(ref name) if dataset.kind(name) == Some(ColumnKind::Numeric) => {
            Some(BriefStats::from_values(&dataset.numeric(name)?))
        }
        _ => None,
    };

    info!(
        column = %column,
        transformation = spec.name(),
        columns_added = added.len(),
        columns_removed = removed.len(),
        "Transform applied"
    );

    Ok(TransformSummary {
        column: column.to_string(),
        transformation: spec.name(),
        before,
        after,
        columns_added: added,
        columns_removed: removed,
        row_count: dataset.height(),
        column_count: dataset.width(),
        detail,
    })
}

fn require_numeric(column: &str, kind: ColumnKind, spec: &TransformSpec) -> Result<()> {
    if kind == ColumnKind::Numeric {
        Ok(())
    } else {
        Err(QuantError::type_mismatch(
            vec![column.to_string()],
            &format!("numeric for '{}'", spec.name()),
        ))
    }
}

fn plan(
    dataset: &Dataset,
    column: &str,
    kind: ColumnKind,
    spec: &TransformSpec,
) -> Result<(Edit, serde_json::Value)> {
    match spec {
        TransformSpec::Normalize => {
            require_numeric(column, kind, spec)?;
            let values = dataset.numeric(column)?;
            let mut scaler = Scaler::new(ScalerType::Standard)?;
            let out = scaler.fit_transform(&values)?;
            let detail = json!({ "params": scaler.params() });
            Ok((Edit::Replace(numeric_column(column, out), ColumnKind::Numeric), detail))
        }
        TransformSpec::Scale(p) => {
            require_numeric(column, kind, spec)?;
            let [low, high] = p.feature_range;
            let values = dataset.numeric(column)?;
            let mut scaler = Scaler::new(ScalerType::MinMax { low, high })?;
            let out = scaler.fit_transform(&values)?;
            let detail = json!({ "feature_range": [low, high], "params": scaler.params() });
            Ok((Edit::Replace(numeric_column(column, out), ColumnKind::Numeric), detail))
        }
        TransformSpec::Log(p) => {
            require_numeric(column, kind, spec)?;
            let log = LogTransform::new(p.offset)?;
            let (out, shift) = log.apply(&dataset.numeric(column)?);
            let detail = json!({ "offset": p.offset, "shift": shift });
            Ok((Edit::Replace(numeric_column(column, out), ColumnKind::Numeric), detail))
        }
        TransformSpec::OneHotEncode => {
            let keys = dataset.keys(column)?;
            let encoder = match kind {
                ColumnKind::Numeric => {
                    let encoder = OneHotEncoder::fit_numeric(&dataset.numeric(column)?);
                    if encoder.categories().len() >= OneHotEncoder::MAX_NUMERIC_LEVELS {
                        return Err(QuantError::type_mismatch(
                            vec![column.to_string()],
                            &format!(
                                "categorical, or numeric with fewer than {} distinct values",
                                OneHotEncoder::MAX_NUMERIC_LEVELS
                            ),
                        ));
                    }
                    encoder
                }
                ColumnKind::Categorical => OneHotEncoder::fit_text(&keys),
                ColumnKind::DateTime => {
                    return Err(QuantError::type_mismatch(
                        vec![column.to_string()],
                        &format!(
                            "categorical, or numeric with fewer than {} distinct values",
                            OneHotEncoder::MAX_NUMERIC_LEVELS
                        ),
                    ));
                }
            };
            if encoder.categories().is_empty() {
                return Err(QuantError::insufficient("one_hot_encode", 1, 0));
            }
            let new_cols = encoder
                .transform(&keys)
                .into_iter()
                .map(|(cat, indicator)| {
                    (numeric_column(&format!("{}_{}", column, cat), indicator), ColumnKind::Numeric)
                })
                .collect();
            let detail = json!({ "categories": encoder.categories() });
            Ok((Edit::Expand(new_cols), detail))
        }
        TransformSpec::Binning(p) => {
            require_numeric(column, kind, spec)?;
            let values = dataset.numeric(column)?;
            let mut binner = Binner::new(p.strategy, p.bins)?;
            binner.fit(&values)?;
            let labels = binner.transform(&values);
            let name = format!("{}_binned", column);
            let detail = json!({
                "strategy": p.strategy,
                "bins_requested": p.bins,
                "bins": binner.n_bins(),
                "edges": binner.edges(),
                "labels": binner.labels(),
            });
            Ok((Edit::InsertAfter(text_column(&name, labels), ColumnKind::Categorical), detail))
        }
        TransformSpec::FillNa(p) => match kind {
            ColumnKind::Numeric => {
                let method = p.method.unwrap_or(ImputeStrategy::Mean);
                let values = dataset.numeric(column)?;
                let fill = numeric_fill_value(method, &values, p.value.as_ref())?;
                let (out, filled) = fill_numeric(&values, fill);
                let detail = json!({ "method": method, "fill_value": fill, "filled": filled });
                Ok((Edit::Replace(numeric_column(column, out), ColumnKind::Numeric), detail))
            }
            _ => {
                let method = p.method.unwrap_or(ImputeStrategy::Mode);
                if matches!(method, ImputeStrategy::Mean | ImputeStrategy::Median) {
                    return Err(QuantError::type_mismatch(
                        vec![column.to_string()],
                        &format!("numeric for fillna method '{}'", method.as_str()),
                    ));
                }
                let values = dataset.text(column)?;
                let fill = text_fill_value(method, &values, p.value.as_ref())?;
                let (out, filled) = fill_text(&values, &fill);
                let detail = json!({ "method": method, "fill_value": fill, "filled": filled });
                Ok((Edit::Replace(text_column(column, out), kind), detail))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{mean, present, sample_std};

    fn dataset() -> Dataset {
        Dataset::from_columns(
            "t.csv",
            vec![
                (
                    numeric_column("x", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), None]),
                    ColumnKind::Numeric,
                ),
                (
                    text_column(
                        "color",
                        ["red", "blue", "red", "green"]
                            .iter()
                            .map(|s| Some(s.to_string()))
                            .chain(std::iter::once(None))
                            .collect(),
                    ),
                    ColumnKind::Categorical,
                ),
                (
                    numeric_column("y", vec![Some(5.0), Some(3.0), Some(5.0), Some(1.0), Some(3.0)]),
                    ColumnKind::Numeric,
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_unknown_and_bad_params() {
        assert!(matches!(
            TransformSpec::parse("sqrt", None),
            Err(QuantError::UnsupportedTransform(_))
        ));
        assert!(matches!(
            TransformSpec::parse("scale", Some(json!({"feature_range": "wide"}))),
            Err(QuantError::InvalidParams(_))
        ));
        assert!(matches!(
            TransformSpec::parse("normalize", Some(json!({"foo": 1}))),
            Err(QuantError::InvalidParams(_))
        ));
        assert_eq!(
            TransformSpec::parse("binning", Some(json!({"n_bins": 3, "strategy": "quantile"}))).unwrap(),
            TransformSpec::Binning(BinningParams {
                bins: 3,
                strategy: BinningStrategy::Quantile
            })
        );
    }

    #[test]
    fn test_normalize_gives_zero_mean_unit_std() {
        let mut ds = dataset();
        let summary = apply(&mut ds, "x", &TransformSpec::Normalize).unwrap();
        let values = present(&ds.numeric("x").unwrap());
        assert!(mean(&values).unwrap().abs() < 1e-12);
        assert!((sample_std(&values).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(summary.before.unwrap().mean, Some(2.5));
        assert!(summary.after.unwrap().mean.unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_scale_default_range() {
        let mut ds = dataset();
        apply(&mut ds, "y", &TransformSpec::Scale(ScaleParams::default())).unwrap();
        let values = present(&ds.numeric("y").unwrap());
        assert_eq!(values.iter().copied().reduce(f64::min), Some(0.0));
        assert_eq!(values.iter().copied().reduce(f64::max), Some(1.0));
    }

    #[test]
    fn test_numeric_transform_rejects_categorical() {
        let mut ds = dataset();
        let before = ds.headers();
        let err = apply(&mut ds, "color", &TransformSpec::Log(LogParams::default())).unwrap_err();
        assert!(matches!(err, QuantError::TypeMismatch { .. }));
        assert_eq!(ds.headers(), before);
    }

    #[test]
    fn test_missing_column() {
        let mut ds = dataset();
        let err = apply(&mut ds, "nope", &TransformSpec::Normalize).unwrap_err();
        assert!(matches!(err, QuantError::ColumnNotFound(_)));
    }

    #[test]
    fn test_one_hot_replaces_in_place() {
        let mut ds = dataset();
        let summary = apply(&mut ds, "color", &TransformSpec::OneHotEncode).unwrap();
        assert_eq!(ds.headers(), vec!["x", "color_blue", "color_green", "color_red", "y"]);
        assert_eq!(summary.columns_removed, vec!["color"]);
        assert_eq!(summary.columns_added.len(), 3);
        assert!(summary.after.is_none());
        assert_eq!(ds.kind("color_red"), Some(ColumnKind::Numeric));
        assert_eq!(
            ds.numeric("color_red").unwrap(),
            vec![Some(1.0), Some(0.0), Some(1.0), Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn test_one_hot_low_cardinality_numeric() {
        let mut ds = dataset();
        apply(&mut ds, "y", &TransformSpec::OneHotEncode).unwrap();
        assert!(ds.has_column("y_1"));
        assert!(ds.has_column("y_3"));
        assert!(ds.has_column("y_5"));
        assert!(!ds.has_column("y"));
    }

    #[test]
    fn test_binning_adds_categorical_column() {
        let mut ds = dataset();
        let spec = TransformSpec::Binning(BinningParams {
            bins: 3,
            strategy: BinningStrategy::Uniform,
        });
        let summary = apply(&mut ds, "x", &spec).unwrap();
        assert_eq!(summary.columns_added, vec!["x_binned"]);
        assert_eq!(ds.position("x_binned"), Some(1));
        assert_eq!(ds.kind("x_binned"), Some(ColumnKind::Categorical));
        assert_eq!(ds.kind("x"), Some(ColumnKind::Numeric));
        let labels = ds.text("x_binned").unwrap();
        assert_eq!(labels[4], None);

        // a second run would collide with the derived column
        let err = apply(&mut ds, "x", &spec).unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
        assert_eq!(ds.width(), 4);
    }

    #[test]
    fn test_fillna_methods() {
        let mut ds = dataset();
        let spec = TransformSpec::FillNa(FillNaParams {
            method: Some(ImputeStrategy::Median),
            value: None,
        });
        let summary = apply(&mut ds, "x", &spec).unwrap();
        assert_eq!(ds.numeric("x").unwrap()[4], Some(2.5));
        assert_eq!(summary.after.unwrap().null_count, 0);

        let err = apply(&mut ds, "color", &spec).unwrap_err();
        assert!(matches!(err, QuantError::TypeMismatch { .. }));

        let mode = TransformSpec::FillNa(FillNaParams::default());
        apply(&mut ds, "color", &mode).unwrap();
        assert_eq!(ds.text("color").unwrap()[4].as_deref(), Some("red"));
    }
}

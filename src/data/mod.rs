//! Tabular store
//!
//! A [`Dataset`] wraps a polars `DataFrame` together with a persisted
//! [`ColumnKind`] per column. Numeric columns are stored as `Float64`;
//! categorical and datetime columns are stored as `String` holding the
//! source text. Kinds are decided once at load time and afterwards only
//! changed by transforms, in the same commit as the data.

mod infer;
mod loader;

pub use infer::{classify_text, is_missing, parse_datetime, parse_number};
pub use loader::{from_frame, load_bytes, load_path, FileFormat};

use crate::error::{QuantError, Result};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    DateTime,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::DateTime => "datetime",
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single tabular structure under analysis
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    frame: DataFrame,
    kinds: Vec<ColumnKind>,
    pub loaded_at: DateTime<Utc>,
}

/// Serializable description of the loaded dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
    pub column_kinds: BTreeMap<String, ColumnKind>,
    pub numeric_columns: Vec<String>,
    pub preview: Vec<Vec<serde_json::Value>>,
    pub loaded_at: String,
}

impl Dataset {
    /// Build a dataset from typed columns. Every column must already be
    /// `Float64` (numeric) or `String` (categorical, datetime).
    pub fn from_columns(name: impl Into<String>, columns: Vec<(Column, ColumnKind)>) -> Result<Self> {
        let (columns, kinds): (Vec<Column>, Vec<ColumnKind>) = columns.into_iter().unzip();
        let frame = DataFrame::new(columns)?;
        Ok(Self {
            id: generate_id(),
            name: name.into(),
            frame,
            kinds,
            loaded_at: Utc::now(),
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn headers(&self) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.frame
            .get_columns()
            .iter()
            .position(|c| c.name().as_str() == name)
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.position(name).map(|i| self.kinds[i])
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .zip(&self.kinds)
            .filter(|(_, k)| **k == ColumnKind::Numeric)
            .map(|(c, _)| c.name().to_string())
            .collect()
    }

    /// Fail with every missing name at once
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| !self.has_column(n))
            .map(|n| n.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(QuantError::ColumnNotFound(missing))
        }
    }

    /// Fail with every non-numeric name at once
    pub fn require_numeric<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        self.require_columns(names)?;
        let offending: Vec<String> = names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| self.kind(n) != Some(ColumnKind::Numeric))
            .map(|n| n.to_string())
            .collect();
        if offending.is_empty() {
            Ok(())
        } else {
            Err(QuantError::type_mismatch(offending, "numeric"))
        }
    }

    fn series(&self, name: &str) -> Result<&Series> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| QuantError::ColumnNotFound(vec![name.to_string()]))?;
        Ok(column.as_materialized_series())
    }

    /// Values of a numeric column, `None` for missing
    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.require_numeric(&[name])?;
        let values = self.series(name)?.f64()?;
        Ok(values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect())
    }

    /// Values of a text column, `None` for missing
    pub fn text(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.require_columns(&[name])?;
        match self.kind(name) {
            Some(ColumnKind::Numeric) => Err(QuantError::type_mismatch(
                vec![name.to_string()],
                "categorical or datetime",
            )),
            _ => {
                let values = self.series(name)?.str()?;
                Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
            }
        }
    }

    /// Values of any column rendered as category keys
    pub fn keys(&self, name: &str) -> Result<Vec<Option<String>>> {
        match self.kind(name) {
            Some(ColumnKind::Numeric) => Ok(self
                .numeric(name)?
                .into_iter()
                .map(|v| v.map(format_number))
                .collect()),
            Some(_) => self.text(name),
            None => Err(QuantError::ColumnNotFound(vec![name.to_string()])),
        }
    }

    /// Current columns paired with their kinds, for rebuilding
    pub(crate) fn columns(&self) -> Vec<(Column, ColumnKind)> {
        self.frame
            .get_columns()
            .iter()
            .cloned()
            .zip(self.kinds.iter().copied())
            .collect()
    }

    /// Replace the columns wholesale. Either everything is swapped or
    /// nothing is.
    pub(crate) fn commit(&mut self, columns: Vec<(Column, ColumnKind)>) -> Result<()> {
        let (columns, kinds): (Vec<Column>, Vec<ColumnKind>) = columns.into_iter().unzip();
        let frame = DataFrame::new(columns)?;
        self.frame = frame;
        self.kinds = kinds;
        Ok(())
    }

    /// First `rows` rows as JSON scalars
    pub fn preview(&self, rows: usize) -> Vec<Vec<serde_json::Value>> {
        let n = rows.min(self.height());
        let columns: Vec<Vec<serde_json::Value>> = self
            .frame
            .get_columns()
            .iter()
            .zip(&self.kinds)
            .map(|(col, kind)| {
                let series = col.as_materialized_series().head(Some(n));
                match kind {
                    ColumnKind::Numeric => series
                        .f64()
                        .map(|ca| ca.into_iter().map(json_number).collect())
                        .unwrap_or_default(),
                    _ => series
                        .str()
                        .map(|ca| {
                            ca.into_iter()
                                .map(|v| v.map_or(serde_json::Value::Null, |s| s.into()))
                                .collect()
                        })
                        .unwrap_or_default(),
                }
            })
            .collect();

        (0..n)
            .map(|row| {
                columns
                    .iter()
                    .map(|col| col.get(row).cloned().unwrap_or(serde_json::Value::Null))
                    .collect()
            })
            .collect()
    }

    pub fn describe(&self, preview_rows: usize) -> DatasetSummary {
        let headers = self.headers();
        let column_kinds = headers
            .iter()
            .cloned()
            .zip(self.kinds.iter().copied())
            .collect();
        DatasetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            row_count: self.height(),
            column_count: self.width(),
            column_kinds,
            numeric_columns: self.numeric_columns(),
            preview: self.preview(preview_rows),
            loaded_at: self.loaded_at.to_rfc3339(),
            headers,
        }
    }
}

/// Short random identifier for a loaded dataset
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

/// Render a number the way it would appear in a source file: integers
/// without a fractional part.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Finite floats become JSON numbers, everything else null
pub fn json_number(v: Option<f64>) -> serde_json::Value {
    v.and_then(serde_json::Number::from_f64)
        .map_or(serde_json::Value::Null, serde_json::Value::Number)
}

pub(crate) fn numeric_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::from(Series::new(name.into(), values))
}

pub(crate) fn text_column(name: &str, values: Vec<Option<String>>) -> Column {
    Column::from(Series::new(name.into(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_columns(
            "sample.csv",
            vec![
                (numeric_column("price", vec![Some(1.0), None, Some(3.5)]), ColumnKind::Numeric),
                (
                    text_column("city", vec![Some("Oslo".into()), Some("Rome".into()), None]),
                    ColumnKind::Categorical,
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_describe_reports_shape_and_kinds() {
        let ds = sample();
        let summary = ds.describe(50);
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.column_count, 2);
        assert_eq!(summary.headers, vec!["price", "city"]);
        assert_eq!(summary.column_kinds["city"], ColumnKind::Categorical);
        assert_eq!(summary.numeric_columns, vec!["price"]);
        assert_eq!(summary.preview.len(), 3);
        assert_eq!(summary.preview[1][0], serde_json::Value::Null);
        assert_eq!(summary.preview[0][1], serde_json::json!("Oslo"));
    }

    #[test]
    fn test_require_columns_names_all_missing() {
        let ds = sample();
        let err = ds.require_columns(&["price", "a", "b"]).unwrap_err();
        match err {
            QuantError::ColumnNotFound(cols) => assert_eq!(cols, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_numeric_access_rejects_text_column() {
        let ds = sample();
        assert!(matches!(ds.numeric("city"), Err(QuantError::TypeMismatch { .. })));
        assert_eq!(ds.numeric("price").unwrap(), vec![Some(1.0), None, Some(3.5)]);
        assert_eq!(ds.keys("price").unwrap()[0].as_deref(), Some("1"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.25), "0.25");
    }
}

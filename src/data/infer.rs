//! Column kind inference

use super::{numeric_column, text_column, ColumnKind};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a trimmed numeric literal. Non-finite spellings are rejected.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Empty cells and non-finite number spellings (`NaN`, `inf`) are missing,
/// the same as a non-finite float read by the CSV parser
pub fn is_missing(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s.parse::<f64>().map_or(false, |v| !v.is_finite())
}

/// Parse a timestamp in one of the accepted layouts
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Decide the kind of a text column from its non-missing values
pub fn classify_text<S: AsRef<str>>(values: &[Option<S>]) -> ColumnKind {
    let present: Vec<&str> = values
        .iter()
        .flatten()
        .map(|s| s.as_ref().trim())
        .filter(|s| !is_missing(s))
        .collect();

    if present.iter().all(|s| parse_number(s).is_some()) {
        ColumnKind::Numeric
    } else if present.iter().all(|s| parse_datetime(s).is_some()) {
        ColumnKind::DateTime
    } else {
        ColumnKind::Categorical
    }
}

/// Build a stored column from raw text cells
pub(crate) fn column_from_text(name: &str, values: Vec<Option<String>>) -> (Column, ColumnKind) {
    let values: Vec<Option<String>> = values
        .into_iter()
        .map(|v| v.filter(|s| !is_missing(s)))
        .collect();

    match classify_text(&values) {
        ColumnKind::Numeric => {
            let numbers = values
                .iter()
                .map(|v| v.as_deref().and_then(parse_number))
                .collect();
            (numeric_column(name, numbers), ColumnKind::Numeric)
        }
        kind => (text_column(name, values), kind),
    }
}

/// Normalise a column produced by a reader into stored form
pub(crate) fn normalize_column(column: &Column) -> Result<(Column, ColumnKind)> {
    let name = column.name().as_str();
    let series = column.as_materialized_series();
    match series.dtype() {
        DataType::Float64
        | DataType::Float32
        | DataType::Int64
        | DataType::Int32
        | DataType::UInt64
        | DataType::UInt32 => {
            let cast = series.cast(&DataType::Float64)?;
            let values = cast
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            Ok((numeric_column(name, values), ColumnKind::Numeric))
        }
        DataType::Boolean => {
            let values = series
                .bool()?
                .into_iter()
                .map(|v| v.map(|b| b.to_string()))
                .collect();
            Ok((text_column(name, values), ColumnKind::Categorical))
        }
        DataType::String => {
            let values = series
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            Ok(column_from_text(name, values))
        }
        _ => {
            let cast = series.cast(&DataType::String)?;
            let values = cast
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            Ok(column_from_text(name, values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_classify_numeric_with_missing() {
        let values = owned(&[Some("1.5"), None, Some(" 2 "), Some("")]);
        assert_eq!(classify_text(&values), ColumnKind::Numeric);
    }

    #[test]
    fn test_classify_datetime() {
        let values = owned(&[Some("2024-01-02"), Some("2024-01-03 10:00:00"), None]);
        assert_eq!(classify_text(&values), ColumnKind::DateTime);
        let values = owned(&[Some("2024-01-02T10:00:00Z")]);
        assert_eq!(classify_text(&values), ColumnKind::DateTime);
    }

    #[test]
    fn test_classify_categorical() {
        let values = owned(&[Some("red"), Some("2"), Some("2024-01-01")]);
        assert_eq!(classify_text(&values), ColumnKind::Categorical);
    }

    #[test]
    fn test_all_missing_is_numeric() {
        let values = owned(&[None, Some("")]);
        assert_eq!(classify_text(&values), ColumnKind::Numeric);
    }

    #[test]
    fn test_parse_number_rejects_non_finite() {
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("-3e2"), Some(-300.0));
    }

    #[test]
    fn test_non_finite_text_is_missing() {
        let values = owned(&[Some("1.5"), Some("NaN"), Some("-inf"), Some("2")]);
        assert_eq!(classify_text(&values), ColumnKind::Numeric);

        let (column, kind) = column_from_text("x", values);
        assert_eq!(kind, ColumnKind::Numeric);
        assert_eq!(column.null_count(), 2);

        let (column, kind) = column_from_text("c", owned(&[Some("red"), Some("nan")]));
        assert_eq!(kind, ColumnKind::Categorical);
        assert_eq!(column.null_count(), 1);
    }

    #[test]
    fn test_column_from_text_stores_floats() {
        let (column, kind) = column_from_text("x", owned(&[Some("1"), Some(""), Some("4")]));
        assert_eq!(kind, ColumnKind::Numeric);
        let values: Vec<Option<f64>> = column
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(1.0), None, Some(4.0)]);
    }
}

//! Parse uploaded bytes into a [`Dataset`]

use super::infer::{column_from_text, normalize_column};
use super::Dataset;
use crate::error::{QuantError, Result};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use polars::prelude::*;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// Source file formats, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" | "xls" | "xlsm" | "ods" => Ok(FileFormat::Spreadsheet),
            "" => Err(QuantError::UnsupportedFormat(format!("'{}' has no extension", filename))),
            other => Err(QuantError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Parse raw file bytes. The extension is checked before any parsing.
pub fn load_bytes(bytes: &[u8], filename: &str) -> Result<Dataset> {
    let format = FileFormat::from_filename(filename)?;
    debug!(file = %filename, bytes = bytes.len(), format = ?format, "Parsing upload");

    let columns = match format {
        FileFormat::Csv => read_csv(bytes)?,
        FileFormat::Spreadsheet => read_spreadsheet(bytes)?,
    };
    if columns.is_empty() {
        return Err(QuantError::MalformedFile("file contains no columns".to_string()));
    }

    let dataset = Dataset::from_columns(filename, columns)?;
    info!(
        file = %filename,
        dataset_id = %dataset.id,
        rows = dataset.height(),
        columns = dataset.width(),
        "Dataset loaded"
    );
    Ok(dataset)
}

/// Adopt an in-memory frame, classifying its columns the same way as a CSV
pub fn from_frame(name: &str, frame: &DataFrame) -> Result<Dataset> {
    let columns = frame
        .get_columns()
        .iter()
        .map(normalize_column)
        .collect::<Result<Vec<_>>>()?;
    Dataset::from_columns(name, columns)
}

/// Read a file from disk, used by the CLI
pub fn load_path(path: &Path) -> Result<Dataset> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    FileFormat::from_filename(&filename)?;
    let bytes = std::fs::read(path)?;
    load_bytes(&bytes, &filename)
}

fn read_csv(bytes: &[u8]) -> Result<Vec<(Column, super::ColumnKind)>> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| QuantError::MalformedFile(e.to_string()))?;

    frame.get_columns().iter().map(normalize_column).collect()
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Vec<(Column, super::ColumnKind)>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| QuantError::MalformedFile("workbook has no worksheets".to_string()))??;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };
    let names = dedupe_headers(header.iter().map(cell_text).collect());

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for row in rows {
        if row.iter().all(|c| cell_text(c).is_none()) {
            continue;
        }
        for (i, values) in cells.iter_mut().enumerate() {
            values.push(row.get(i).and_then(cell_text));
        }
    }

    Ok(names
        .iter()
        .zip(cells)
        .map(|(name, values)| column_from_text(name, values))
        .collect())
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        #[allow(unreachable_patterns)]
        other => other.as_string(),
    }
}

/// Blank headers get positional names; repeats get a numeric suffix
fn dedupe_headers(raw: Vec<Option<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = name.unwrap_or_else(|| format!("column_{}", i + 1));
            let mut candidate = base.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

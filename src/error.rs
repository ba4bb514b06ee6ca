//! Error types for the quantlab analysis engine

use thiserror::Error;

/// Result type alias for quantlab operations
pub type Result<T> = std::result::Result<T, QuantError>;

/// Main error type for dataset, transform, statistics and model operations
#[derive(Error, Debug)]
pub enum QuantError {
    #[error("Unsupported file format: {0}. Use .csv, .xlsx, .xls, .xlsm or .ods")]
    UnsupportedFormat(String),

    #[error("Could not parse file: {0}")]
    MalformedFile(String),

    #[error("Column(s) not found: {}", .0.join(", "))]
    ColumnNotFound(Vec<String>),

    #[error("Type mismatch: column(s) {} must be {expected}", columns.join(", "))]
    TypeMismatch {
        columns: Vec<String>,
        expected: String,
    },

    #[error("Model '{0}' is supervised and requires a y_column")]
    MissingTarget(String),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Unsupported transformation: {0}")]
    UnsupportedTransform(String),

    #[error("Invalid parameter: {0}")]
    InvalidParams(String),

    #[error("Insufficient data for {operation}: need at least {needed}, got {actual}")]
    InsufficientData {
        operation: String,
        needed: usize,
        actual: usize,
    },

    #[error("No dataset loaded. Upload a file first")]
    NoDataset,

    #[error("Data error: {0}")]
    Data(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuantError {
    /// Stable classification string reported to clients
    pub fn kind(&self) -> &'static str {
        match self {
            QuantError::UnsupportedFormat(_) | QuantError::MalformedFile(_) => "format_error",
            QuantError::ColumnNotFound(_) => "column_not_found",
            QuantError::TypeMismatch { .. } => "type_mismatch",
            QuantError::MissingTarget(_) => "missing_target",
            QuantError::UnsupportedModel(_) => "unsupported_model",
            QuantError::UnsupportedTransform(_) => "unsupported_transform",
            QuantError::InvalidParams(_) => "invalid_params",
            QuantError::InsufficientData { .. } => "insufficient_data",
            QuantError::NoDataset => "no_dataset",
            QuantError::Data(_) => "data_error",
            QuantError::Computation(_) => "computation_error",
            QuantError::Io(_) => "io_error",
        }
    }

    /// Whether the caller can fix the request and retry
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            QuantError::Data(_) | QuantError::Computation(_) | QuantError::Io(_)
        )
    }

    pub(crate) fn type_mismatch(columns: Vec<String>, expected: &str) -> Self {
        QuantError::TypeMismatch {
            columns,
            expected: expected.to_string(),
        }
    }

    pub(crate) fn insufficient(operation: &str, needed: usize, actual: usize) -> Self {
        QuantError::InsufficientData {
            operation: operation.to_string(),
            needed,
            actual,
        }
    }
}

impl From<polars::error::PolarsError> for QuantError {
    fn from(err: polars::error::PolarsError) -> Self {
        QuantError::Data(err.to_string())
    }
}

impl From<calamine::Error> for QuantError {
    fn from(err: calamine::Error) -> Self {
        QuantError::MalformedFile(err.to_string())
    }
}

impl From<ndarray::ShapeError> for QuantError {
    fn from(err: ndarray::ShapeError) -> Self {
        QuantError::Computation(format!("invalid matrix shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuantError::ColumnNotFound(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Column(s) not found: a, b");

        let err = QuantError::type_mismatch(vec!["city".to_string()], "numeric");
        assert_eq!(err.to_string(), "Type mismatch: column(s) city must be numeric");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(QuantError::NoDataset.kind(), "no_dataset");
        assert_eq!(QuantError::UnsupportedFormat(".txt".into()).kind(), "format_error");
        assert_eq!(QuantError::insufficient("risk metrics", 10, 3).kind(), "insufficient_data");
        assert!(QuantError::MissingTarget("svm".into()).is_client_error());
        assert!(!QuantError::Computation("singular".into()).is_client_error());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QuantError = io_err.into();
        assert!(matches!(err, QuantError::Io(_)));
    }
}

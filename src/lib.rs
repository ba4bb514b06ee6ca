//! quantlab - stateful tabular analysis engine
//!
//! Load a CSV or spreadsheet into a single analysis session, then transform
//! columns, compute descriptive statistics and correlations, fit classifiers
//! and clustering models, and run risk, portfolio and backtest analytics over
//! price columns. Every result is serializable to JSON.
//!
//! # Modules
//!
//! - [`data`] - Tabular store: loading, column kinds, previews
//! - [`preprocessing`] - Column transforms (normalize, scale, log, one-hot, binning, fillna)
//! - [`stats`] - Descriptive statistics and correlation
//! - [`training`] - Supervised classifiers and clustering
//! - [`finance`] - Risk metrics, portfolio allocation, backtesting
//! - [`session`] - The analysis session tying the above together
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

pub mod error;

pub mod data;
pub mod finance;
pub mod preprocessing;
pub mod stats;
pub mod training;

pub mod session;

pub mod cli;
pub mod server;

pub use error::{QuantError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{QuantError, Result};

    pub use crate::data::{load_bytes, load_path, ColumnKind, Dataset, DatasetSummary};

    pub use crate::preprocessing::{apply as apply_transform, TransformSpec, TransformSummary};

    pub use crate::stats::{
        column_stats, correlate, summarize, ColumnStats, CorrelationMethod, CorrelationResult, Summary,
    };

    pub use crate::training::{fit, FitRequest, FitResult, ModelSpec};

    pub use crate::finance::{
        backtest, optimize_portfolio, risk_metrics, BacktestRequest, PortfolioMethod, PortfolioRequest,
        RiskRequest, Strategy,
    };

    pub use crate::session::AnalysisSession;
}

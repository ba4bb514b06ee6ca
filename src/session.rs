//! Analysis session
//!
//! Owns at most one [`Dataset`]. Every operation other than [`AnalysisSession::load`]
//! fails with [`QuantError::NoDataset`] until a file has been loaded. Loading
//! parses into a fresh dataset first and only then replaces the current one,
//! so a malformed upload never disturbs the previous data.

use crate::data::{load_bytes, Dataset, DatasetSummary};
use crate::error::{QuantError, Result};
use crate::finance::{
    backtest, optimize_portfolio, risk_metrics, BacktestRequest, BacktestResult, PortfolioAllocation,
    PortfolioRequest, RiskMetrics, RiskRequest,
};
use crate::preprocessing::{self, TransformSpec, TransformSummary};
use crate::stats::{self, ColumnStats, CorrelationMethod, CorrelationResult, Summary};
use crate::training::{self, FitRequest, FitResult};
use tracing::info;

/// Largest preview a client may request
pub const MAX_PREVIEW_ROWS: usize = 1000;

#[derive(Debug, Default)]
pub struct AnalysisSession {
    dataset: Option<Dataset>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_dataset(&self) -> bool {
        self.dataset.is_some()
    }

    pub fn dataset(&self) -> Result<&Dataset> {
        self.dataset.as_ref().ok_or(QuantError::NoDataset)
    }

    fn dataset_mut(&mut self) -> Result<&mut Dataset> {
        self.dataset.as_mut().ok_or(QuantError::NoDataset)
    }

    /// Replace the current dataset with the parsed contents of `bytes`
    pub fn load(&mut self, bytes: &[u8], filename: &str, preview_rows: usize) -> Result<DatasetSummary> {
        let dataset = load_bytes(bytes, filename)?;
        let summary = dataset.describe(preview_rows);
        if let Some(previous) = self.dataset.replace(dataset) {
            info!(previous = %previous.id, current = %summary.id, "Replaced dataset");
        }
        Ok(summary)
    }

    /// Install an already built dataset
    pub fn replace(&mut self, dataset: Dataset) {
        self.dataset = Some(dataset);
    }

    pub fn describe(&self, preview_rows: usize) -> Result<DatasetSummary> {
        Ok(self.dataset()?.describe(preview_rows))
    }

    pub fn preview(&self, rows: usize) -> Result<Vec<Vec<serde_json::Value>>> {
        Ok(self.dataset()?.preview(rows.min(MAX_PREVIEW_ROWS)))
    }

    /// Drop the dataset, returning whether one was loaded
    pub fn clear(&mut self) -> bool {
        self.dataset.take().is_some()
    }

    pub fn transform(
        &mut self,
        column: &str,
        transformation: &str,
        params: Option<serde_json::Value>,
    ) -> Result<TransformSummary> {
        let spec = TransformSpec::parse(transformation, params)?;
        preprocessing::apply(self.dataset_mut()?, column, &spec)
    }

    pub fn statistics(&self, columns: Option<&[String]>) -> Result<Summary> {
        stats::summarize(self.dataset()?, columns)
    }

    pub fn column_stats(&self, column: &str) -> Result<ColumnStats> {
        stats::column_stats(self.dataset()?, column)
    }

    pub fn correlate(&self, columns: Option<&[String]>, method: Option<&str>) -> Result<CorrelationResult> {
        let method = match method {
            Some(m) => m.parse()?,
            None => CorrelationMethod::default(),
        };
        stats::correlate(self.dataset()?, columns, method)
    }

    pub fn fit(&self, request: &FitRequest) -> Result<FitResult> {
        training::fit(self.dataset()?, request)
    }

    pub fn risk_metrics(&self, request: &RiskRequest) -> Result<RiskMetrics> {
        risk_metrics(self.dataset()?, request)
    }

    pub fn optimize_portfolio(&self, request: &PortfolioRequest) -> Result<PortfolioAllocation> {
        optimize_portfolio(self.dataset()?, request)
    }

    pub fn backtest(&self, request: &BacktestRequest) -> Result<BacktestResult> {
        backtest(self.dataset()?, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "a,b,label\n1,2,x\n2,4,y\n3,6,x\n4,8,y\n";

    fn loaded() -> AnalysisSession {
        let mut session = AnalysisSession::new();
        session.load(CSV.as_bytes(), "data.csv", 50).unwrap();
        session
    }

    #[test]
    fn test_empty_session_reports_no_dataset() {
        let session = AnalysisSession::new();
        assert!(!session.has_dataset());
        assert_eq!(session.describe(10).unwrap_err().kind(), "no_dataset");
        assert_eq!(session.statistics(None).unwrap_err().kind(), "no_dataset");
        assert_eq!(session.correlate(None, None).unwrap_err().kind(), "no_dataset");
    }

    #[test]
    fn test_load_and_describe() {
        let session = loaded();
        let summary = session.describe(2).unwrap();
        assert_eq!(summary.row_count, 4);
        assert_eq!(summary.column_count, 3);
        assert_eq!(summary.preview.len(), 2);
        assert_eq!(session.preview(5000).unwrap().len(), 4);
    }

    #[test]
    fn test_failed_load_keeps_previous_dataset() {
        let mut session = loaded();
        let id = session.dataset().unwrap().id.clone();
        let err = session.load(b"whatever", "notes.txt", 50).unwrap_err();
        assert_eq!(err.kind(), "format_error");
        assert_eq!(session.dataset().unwrap().id, id);
        assert_eq!(session.dataset().unwrap().height(), 4);
    }

    #[test]
    fn test_transform_mutates_session() {
        let mut session = loaded();
        let summary = session.transform("a", "scale", None).unwrap();
        assert_eq!(summary.transformation, "scale");
        let a = session.dataset().unwrap().numeric("a").unwrap();
        assert_eq!(a.first().copied().flatten(), Some(0.0));
        assert_eq!(a.last().copied().flatten(), Some(1.0));

        let err = session.transform("a", "sqrt", None).unwrap_err();
        assert_eq!(err.kind(), "unsupported_transform");
    }

    #[test]
    fn test_correlate_parses_method() {
        let session = loaded();
        let result = session.correlate(None, Some("spearman")).unwrap();
        assert_eq!(result.method, CorrelationMethod::Spearman);
        assert_eq!(result.pairs.len(), 1);
        let err = session.correlate(None, Some("distance")).unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
    }

    #[test]
    fn test_clear() {
        let mut session = loaded();
        assert!(session.clear());
        assert!(!session.clear());
        assert!(session.dataset().is_err());
    }
}

//! Financial analytics over price columns
//!
//! Price columns are numeric columns read in row order with missing values
//! skipped. Returns are simple period returns; annualisation assumes
//! [`TRADING_DAYS`] periods per year unless a request says otherwise.

mod backtest;
mod portfolio;
mod risk;

pub use backtest::{backtest, BacktestRequest, BacktestResult, Strategy};
pub use portfolio::{optimize_portfolio, PortfolioAllocation, PortfolioMethod, PortfolioRequest};
pub use risk::{risk_metrics, RiskMetrics, RiskRequest};

use crate::data::Dataset;
use crate::error::{QuantError, Result};
use crate::stats::present;

pub const TRADING_DAYS: f64 = 252.0;

/// Non-missing values of a numeric column, in row order
pub fn price_series(dataset: &Dataset, column: &str) -> Result<Vec<f64>> {
    Ok(present(&dataset.numeric(column)?))
}

/// Prices must be strictly positive for returns to be defined
fn require_positive(column: &str, prices: &[f64]) -> Result<()> {
    match prices.iter().position(|&p| p <= 0.0) {
        Some(row) => Err(QuantError::InvalidParams(format!(
            "column '{}' has a non-positive price ({}) at observation {}",
            column,
            prices[row],
            row + 1
        ))),
        None => Ok(()),
    }
}

/// `p[t] / p[t-1] - 1`
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Largest peak-to-trough decline as a fraction of the peak
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}

/// `(mean - risk_free) / volatility`, 0 when volatility is 0
fn sharpe(annual_return: f64, risk_free: f64, volatility: f64) -> f64 {
    if volatility > 0.0 {
        (annual_return - risk_free) / volatility
    } else {
        0.0
    }
}

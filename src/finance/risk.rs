use super::{price_series, require_positive, sharpe, simple_returns, max_drawdown, TRADING_DAYS};
use crate::data::Dataset;
use crate::error::{QuantError, Result};
use crate::stats::{mean, population_std, quantile_sorted, sort_floats};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MIN_PRICES: usize = 10;

fn default_periods() -> f64 {
    TRADING_DAYS
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskRequest {
    pub column: String,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default = "default_periods")]
    pub periods_per_year: f64,
}

impl RiskRequest {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            risk_free_rate: 0.0,
            periods_per_year: TRADING_DAYS,
        }
    }
}

/// Risk profile of one price series. Returns and volatility are annualised;
/// VaR, CVaR and drawdown are positive loss fractions per period.
#[derive(Debug, Clone, Serialize)]
pub struct RiskMetrics {
    pub column: String,
    pub observations: usize,
    pub mean_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub max_drawdown: f64,
}

pub fn risk_metrics(dataset: &Dataset, request: &RiskRequest) -> Result<RiskMetrics> {
    if !(request.periods_per_year > 0.0) {
        return Err(QuantError::InvalidParams(format!(
            "periods_per_year must be positive, got {}",
            request.periods_per_year
        )));
    }
    let prices = price_series(dataset, &request.column)?;
    if prices.len() < MIN_PRICES {
        return Err(QuantError::insufficient("risk metrics", MIN_PRICES, prices.len()));
    }
    require_positive(&request.column, &prices)?;

    let returns = simple_returns(&prices);
    let periods = request.periods_per_year;
    let mean_return = mean(&returns).unwrap_or(0.0) * periods;
    let volatility = population_std(&returns).unwrap_or(0.0) * periods.sqrt();

    let mut sorted = returns.clone();
    sort_floats(&mut sorted);
    let q05 = quantile_sorted(&sorted, 0.05).unwrap_or(0.0);
    let q01 = quantile_sorted(&sorted, 0.01).unwrap_or(0.0);
    let tail: Vec<f64> = sorted.iter().copied().take_while(|&r| r <= q05).collect();
    let cvar_95 = -mean(&tail).unwrap_or(q05);

    debug!(column = %request.column, observations = prices.len(), "Computed risk metrics");

    Ok(RiskMetrics {
        column: request.column.clone(),
        observations: prices.len(),
        mean_return,
        volatility,
        sharpe_ratio: sharpe(mean_return, request.risk_free_rate, volatility),
        var_95: -q05,
        var_99: -q01,
        cvar_95,
        max_drawdown: max_drawdown(&prices),
    })
}

use super::{max_drawdown, price_series, require_positive, sharpe, simple_returns, TRADING_DAYS};
use crate::data::Dataset;
use crate::error::{QuantError, Result};
use crate::stats::{mean, population_std};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

const MIN_PRICES: usize = 50;
const PREVIEW_VALUES: usize = 100;

/// Long/flat signal rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Always invested
    #[default]
    BuyHold,
    /// Long while the price is above the mean of the previous `parameter` prices
    Sma,
    /// Long while the price is above the price `parameter` periods ago
    Momentum,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::BuyHold, Strategy::Sma, Strategy::Momentum];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::BuyHold => "buyhold",
            Strategy::Sma => "sma",
            Strategy::Momentum => "momentum",
        }
    }

    /// One long (true) / flat (false) flag per price
    fn signals(&self, prices: &[f64], lookback: usize) -> Vec<bool> {
        match self {
            Strategy::BuyHold => vec![true; prices.len()],
            Strategy::Sma => {
                let mut window_sum: f64 = prices.iter().take(lookback).sum();
                (0..prices.len())
                    .map(|i| {
                        if i < lookback {
                            return false;
                        }
                        let long = prices[i] > window_sum / lookback as f64;
                        window_sum += prices[i] - prices[i - lookback];
                        long
                    })
                    .collect()
            }
            Strategy::Momentum => (0..prices.len())
                .map(|i| i >= lookback && prices[i] > prices[i - lookback])
                .collect(),
        }
    }
}

impl FromStr for Strategy {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyhold" | "buy_hold" | "buy_and_hold" => Ok(Strategy::BuyHold),
            "sma" | "moving_average" => Ok(Strategy::Sma),
            "momentum" => Ok(Strategy::Momentum),
            other => Err(QuantError::InvalidParams(format!(
                "unknown strategy '{}', expected buyhold, sma or momentum",
                other
            ))),
        }
    }
}

fn default_parameter() -> usize {
    20
}

fn default_capital() -> f64 {
    10_000.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestRequest {
    pub price_column: String,
    #[serde(default, alias = "strategy")]
    pub strategy_type: Option<String>,
    #[serde(default = "default_parameter")]
    pub parameter: usize,
    #[serde(default = "default_capital")]
    pub initial_capital: f64,
}

impl BacktestRequest {
    pub fn new(price_column: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            price_column: price_column.into(),
            strategy_type: Some(strategy.as_str().to_string()),
            parameter: default_parameter(),
            initial_capital: default_capital(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub price_column: String,
    pub strategy: Strategy,
    pub parameter: usize,
    pub initial_capital: f64,
    pub final_value: f64,
    /// Percent
    pub total_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// Buys plus sells
    pub trades: usize,
    pub periods: usize,
    /// First values of the equity curve
    pub portfolio_values: Vec<f64>,
}

/// All-in/all-out simulation without costs
pub fn backtest(dataset: &Dataset, request: &BacktestRequest) -> Result<BacktestResult> {
    let strategy = match request.strategy_type.as_deref() {
        Some(s) => s.parse()?,
        None => Strategy::default(),
    };
    if !(request.initial_capital > 0.0) {
        return Err(QuantError::InvalidParams(format!(
            "initial_capital must be positive, got {}",
            request.initial_capital
        )));
    }

    let prices = price_series(dataset, &request.price_column)?;
    if prices.len() < MIN_PRICES {
        return Err(QuantError::insufficient("backtest", MIN_PRICES, prices.len()));
    }
    if request.parameter == 0 || request.parameter >= prices.len() {
        return Err(QuantError::InvalidParams(format!(
            "parameter must be between 1 and {}, got {}",
            prices.len() - 1,
            request.parameter
        )));
    }
    require_positive(&request.price_column, &prices)?;

    let signals = strategy.signals(&prices, request.parameter);
    let mut cash = request.initial_capital;
    let mut position = 0.0;
    let mut trades = 0;
    let values: Vec<f64> = prices
        .iter()
        .zip(&signals)
        .map(|(&price, &long)| {
            if long && position == 0.0 {
                position = cash / price;
                cash = 0.0;
                trades += 1;
            } else if !long && position > 0.0 {
                cash = position * price;
                position = 0.0;
                trades += 1;
            }
            cash + position * price
        })
        .collect();

    let returns = simple_returns(&values);
    let volatility = population_std(&returns).unwrap_or(0.0) * TRADING_DAYS.sqrt();
    let annual_return = mean(&returns).unwrap_or(0.0) * TRADING_DAYS;
    let final_value = values.last().copied().unwrap_or(request.initial_capital);

    debug!(
        strategy = strategy.as_str(),
        periods = prices.len(),
        trades,
        final_value,
        "Backtest finished"
    );

    Ok(BacktestResult {
        price_column: request.price_column.clone(),
        strategy,
        parameter: request.parameter,
        initial_capital: request.initial_capital,
        final_value,
        total_return: (final_value - request.initial_capital) / request.initial_capital * 100.0,
        volatility,
        sharpe_ratio: sharpe(annual_return, 0.0, volatility),
        max_drawdown: max_drawdown(&values),
        trades,
        periods: prices.len(),
        portfolio_values: values.into_iter().take(PREVIEW_VALUES).collect(),
    })
}

use super::{price_series, require_positive, sharpe, simple_returns, TRADING_DAYS};
use crate::data::Dataset;
use crate::error::{QuantError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

const MIN_PRICES: usize = 10;
const RIDGE: f64 = 1e-6;
const RISK_PARITY_TOL: f64 = 1e-8;
const RISK_PARITY_MAX_ITER: usize = 1000;

/// Allocation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioMethod {
    #[default]
    EqualWeight,
    MinVariance,
    RiskParity,
}

impl PortfolioMethod {
    pub const ALL: [PortfolioMethod; 3] = [
        PortfolioMethod::EqualWeight,
        PortfolioMethod::MinVariance,
        PortfolioMethod::RiskParity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PortfolioMethod::EqualWeight => "equal_weight",
            PortfolioMethod::MinVariance => "min_variance",
            PortfolioMethod::RiskParity => "risk_parity",
        }
    }
}

impl FromStr for PortfolioMethod {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal_weight" | "equal" => Ok(PortfolioMethod::EqualWeight),
            "min_variance" | "minimum_variance" => Ok(PortfolioMethod::MinVariance),
            "risk_parity" => Ok(PortfolioMethod::RiskParity),
            other => Err(QuantError::InvalidParams(format!(
                "unknown portfolio method '{}', expected equal_weight, min_variance or risk_parity",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioRequest {
    pub columns: Vec<String>,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioAllocation {
    pub method: PortfolioMethod,
    pub assets: Vec<String>,
    pub weights: Vec<f64>,
    /// Annualised mean portfolio return
    pub expected_return: f64,
    /// Annualised portfolio volatility
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Share of portfolio variance per asset, summing to 1
    pub risk_contributions: Vec<f64>,
    pub observations: usize,
}

pub fn optimize_portfolio(dataset: &Dataset, request: &PortfolioRequest) -> Result<PortfolioAllocation> {
    let method = match request.method.as_deref() {
        Some(m) => m.parse()?,
        None => PortfolioMethod::default(),
    };
    if request.columns.len() < 2 {
        return Err(QuantError::InvalidParams(
            "portfolio optimisation needs at least 2 columns".to_string(),
        ));
    }
    dataset.require_columns(&request.columns)?;
    dataset.require_numeric(&request.columns)?;

    let mut series = Vec::with_capacity(request.columns.len());
    for column in &request.columns {
        let prices = price_series(dataset, column)?;
        if prices.len() < MIN_PRICES {
            return Err(QuantError::insufficient(
                &format!("portfolio asset '{}'", column),
                MIN_PRICES,
                prices.len(),
            ));
        }
        require_positive(column, &prices)?;
        series.push(simple_returns(&prices));
    }

    // Align on the shortest history
    let n_obs = series.iter().map(Vec::len).min().unwrap_or(0);
    let n_assets = series.len();
    let returns = Array2::from_shape_fn((n_obs, n_assets), |(t, a)| series[a][t]);
    let cov = covariance(&returns);
    let means = returns
        .mean_axis(ndarray::Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_assets));

    let weights = match method {
        PortfolioMethod::EqualWeight => equal_weights(n_assets),
        PortfolioMethod::MinVariance => min_variance_weights(&cov),
        PortfolioMethod::RiskParity => risk_parity_weights(&cov),
    };

    let variance = weights.dot(&cov.dot(&weights)).max(0.0);
    let expected_return = weights.dot(&means) * TRADING_DAYS;
    let volatility = (variance * TRADING_DAYS).sqrt();
    let risk_contributions = risk_contributions(&weights, &cov);

    debug!(method = method.as_str(), assets = n_assets, observations = n_obs, "Optimised portfolio");

    Ok(PortfolioAllocation {
        method,
        assets: request.columns.clone(),
        weights: weights.to_vec(),
        expected_return,
        volatility,
        sharpe_ratio: sharpe(expected_return, 0.0, volatility),
        risk_contributions: risk_contributions.to_vec(),
        observations: n_obs,
    })
}

/// Population covariance of the columns of `returns`
fn covariance(returns: &Array2<f64>) -> Array2<f64> {
    let n = returns.nrows().max(1) as f64;
    let means = returns
        .mean_axis(ndarray::Axis(0))
        .unwrap_or_else(|| Array1::zeros(returns.ncols()));
    let centered = returns - &means;
    centered.t().dot(&centered) / n
}

fn equal_weights(n: usize) -> Array1<f64> {
    Array1::from_elem(n, 1.0 / n as f64)
}

/// `Σ⁻¹1 / 1ᵀΣ⁻¹1`, clipped to long-only
fn min_variance_weights(cov: &Array2<f64>) -> Array1<f64> {
    let n = cov.nrows();
    let mut reg = cov.clone();
    for i in 0..n {
        reg[[i, i]] += RIDGE;
    }
    let Some(raw) = cholesky_solve(&reg, &Array1::ones(n)) else {
        warn!("Covariance matrix is not positive definite, falling back to equal weights");
        return equal_weights(n);
    };
    let clipped = raw.mapv(|w| w.max(0.0));
    let total = clipped.sum();
    if total > 0.0 && total.is_finite() {
        clipped / total
    } else {
        equal_weights(n)
    }
}

/// Multiplicative fixed point towards equal risk contributions
fn risk_parity_weights(cov: &Array2<f64>) -> Array1<f64> {
    let n = cov.nrows();
    let target = 1.0 / n as f64;
    let mut weights = equal_weights(n);
    for _ in 0..RISK_PARITY_MAX_ITER {
        let shares = risk_contributions(&weights, cov);
        let mut next = weights.clone();
        for i in 0..n {
            if shares[i] > 0.0 {
                next[i] *= (target / shares[i]).sqrt();
            }
        }
        let total = next.sum();
        if !(total > 0.0) {
            break;
        }
        next /= total;
        let change = (&next - &weights).fold(0.0f64, |m, d| m.max(d.abs()));
        weights = next;
        if change < RISK_PARITY_TOL {
            break;
        }
    }
    weights
}

/// `w_i (Σw)_i / wᵀΣw`
fn risk_contributions(weights: &Array1<f64>, cov: &Array2<f64>) -> Array1<f64> {
    let marginal = cov.dot(weights);
    let total = weights.dot(&marginal);
    if total > 0.0 {
        weights * &marginal / total
    } else {
        Array1::zeros(weights.len())
    }
}

/// Solve the symmetric positive-definite system `a x = b`
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    // Backward substitution: Lᵀ x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::load_bytes;
    use ndarray::array;

    /// Two independent-ish assets, `b` twice as volatile as `a`
    fn two_assets() -> Dataset {
        let mut csv = String::from("a,b,c\n");
        let (mut pa, mut pb) = (100.0, 100.0);
        for i in 0..40 {
            let shock = if i % 2 == 0 { 0.01 } else { -0.01 };
            let shock_b = if i % 4 < 2 { 0.02 } else { -0.02 };
            pa *= 1.0 + shock;
            pb *= 1.0 + shock_b;
            csv.push_str(&format!("{},{},{}\n", pa, pb, 100 + i));
        }
        load_bytes(csv.as_bytes(), "assets.csv").unwrap()
    }

    fn request(columns: &[&str], method: Option<&str>) -> PortfolioRequest {
        PortfolioRequest {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            method: method.map(str::to_string),
        }
    }

    #[test]
    fn test_equal_weight_default() {
        let ds = two_assets();
        let alloc = optimize_portfolio(&ds, &request(&["a", "b"], None)).unwrap();
        assert_eq!(alloc.method, PortfolioMethod::EqualWeight);
        assert_eq!(alloc.weights, vec![0.5, 0.5]);
        assert_eq!(alloc.observations, 39);
        let total: f64 = alloc.risk_contributions.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_variance_prefers_calm_asset() {
        let ds = two_assets();
        let alloc = optimize_portfolio(&ds, &request(&["a", "b"], Some("min_variance"))).unwrap();
        assert!(alloc.weights[0] > alloc.weights[1]);
        assert!((alloc.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(alloc.weights.iter().all(|&w| w >= 0.0));
    }

    #[test]
    fn test_risk_parity_equalises_contributions() {
        let ds = two_assets();
        let alloc = optimize_portfolio(&ds, &request(&["a", "b"], Some("risk_parity"))).unwrap();
        let rc = &alloc.risk_contributions;
        assert!((rc[0] - rc[1]).abs() < 1e-4, "{:?}", rc);
        assert!(alloc.weights[0] > alloc.weights[1]);
    }

    #[test]
    fn test_validation() {
        let ds = two_assets();
        let err = optimize_portfolio(&ds, &request(&["a"], None)).unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
        let err = optimize_portfolio(&ds, &request(&["a", "zz"], None)).unwrap_err();
        assert_eq!(err.kind(), "column_not_found");
        let err = optimize_portfolio(&ds, &request(&["a", "b"], Some("kelly"))).unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
    }

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let x = cholesky_solve(&a, &array![2.0, 1.0]).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
        assert!(cholesky_solve(&array![[0.0, 0.0], [0.0, 1.0]], &array![1.0, 1.0]).is_none());
    }
}

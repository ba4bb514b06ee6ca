//! Feature scaling: z-score and min-max over dataset columns, plus a
//! standard scaler for model matrices

use crate::error::{QuantError, Result};
use crate::stats::{mean, present, sample_std};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalerType {
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standard,
    /// Min-Max scaling into a target range
    MinMax { low: f64, high: f64 },
}

/// Fitted centre and scale of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScalerParams {
    pub center: f64,
    pub scale: f64,
}

/// Column scaler over optional values
#[derive(Debug, Clone)]
pub struct Scaler {
    scaler_type: ScalerType,
    params: Option<ScalerParams>,
}

impl Scaler {
    pub fn new(scaler_type: ScalerType) -> Result<Self> {
        if let ScalerType::MinMax { low, high } = scaler_type {
            if !(low.is_finite() && high.is_finite() && low < high) {
                return Err(QuantError::InvalidParams(format!(
                    "feature_range must satisfy low < high, got [{}, {}]",
                    low, high
                )));
            }
        }
        Ok(Self {
            scaler_type,
            params: None,
        })
    }

    /// Learn centre and scale. A zero spread falls back to a scale of 1.
    pub fn fit(&mut self, values: &[Option<f64>]) -> &mut Self {
        let data = present(values);
        let params = match self.scaler_type {
            ScalerType::Standard => {
                let center = mean(&data).unwrap_or(0.0);
                let std = sample_std(&data).unwrap_or(0.0);
                ScalerParams {
                    center,
                    scale: if std > 0.0 { std } else { 1.0 },
                }
            }
            ScalerType::MinMax { .. } => {
                let min = data.iter().copied().reduce(f64::min).unwrap_or(0.0);
                let max = data.iter().copied().reduce(f64::max).unwrap_or(0.0);
                let range = max - min;
                ScalerParams {
                    center: min,
                    scale: if range > 0.0 { range } else { 1.0 },
                }
            }
        };
        self.params = Some(params);
        self
    }

    pub fn params(&self) -> Option<ScalerParams> {
        self.params
    }

    pub fn transform(&self, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
        let p = self
            .params
            .ok_or_else(|| QuantError::Computation("scaler used before fit".to_string()))?;
        Ok(values
            .iter()
            .map(|v| {
                v.map(|x| {
                    let z = (x - p.center) / p.scale;
                    match self.scaler_type {
                        ScalerType::Standard => z,
                        ScalerType::MinMax { low, high } => low + z * (high - low),
                    }
                })
            })
            .collect())
    }

    pub fn fit_transform(&mut self, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
        self.fit(values);
        self.transform(values)
    }
}

/// Per-feature standardisation for model inputs. Fitted on the training
/// rows and applied unchanged to held-out rows.
#[derive(Debug, Clone, Serialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(QuantError::Computation("cannot fit scaler on zero rows".to_string()));
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| QuantError::Computation("empty matrix".to_string()))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standard_scaler_column() {
        let values = vec![Some(1.0), Some(2.0), None, Some(3.0)];
        let mut scaler = Scaler::new(ScalerType::Standard).unwrap();
        let out = scaler.fit_transform(&values).unwrap();
        assert_eq!(out[2], None);
        assert!((out[0].unwrap() + 1.0).abs() < 1e-12);
        assert!(out[1].unwrap().abs() < 1e-12);
        assert!((out[3].unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_minmax_custom_range() {
        let values = vec![Some(10.0), Some(20.0), Some(15.0)];
        let mut scaler = Scaler::new(ScalerType::MinMax { low: -1.0, high: 1.0 }).unwrap();
        let out = scaler.fit_transform(&values).unwrap();
        assert_eq!(out, vec![Some(-1.0), Some(1.0), Some(0.0)]);
    }

    #[test]
    fn test_constant_column_does_not_divide_by_zero() {
        let values = vec![Some(5.0), Some(5.0)];
        let mut scaler = Scaler::new(ScalerType::Standard).unwrap();
        assert_eq!(scaler.fit_transform(&values).unwrap(), vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(Scaler::new(ScalerType::MinMax { low: 1.0, high: 1.0 }).is_err());
    }

    #[test]
    fn test_matrix_standard_scaler() {
        let train = array![[1.0, 10.0], [3.0, 10.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let out = scaler.transform(&array![[2.0, 10.0], [5.0, 12.0]]);
        assert!(out[[0, 0]].abs() < 1e-12);
        assert!((out[[1, 0]] - 3.0).abs() < 1e-12);
        assert!((out[[1, 1]] - 2.0).abs() < 1e-12);
    }
}

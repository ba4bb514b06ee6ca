//! Support vector classifier
//!
//! Trained with simplified SMO (Sequential Minimal Optimization) over a
//! precomputed kernel matrix. More than two classes are handled one-vs-rest.

use crate::error::{QuantError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error to prevent OOM.
pub const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = (γ x · y + 1)^d
    Polynomial { degree: u32, gamma: f64 },
    /// K(x, y) = exp(-γ ||x - y||²)
    Rbf { gamma: f64 },
}

impl KernelType {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match *self {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial { degree, gamma } => (gamma * a.dot(&b) + 1.0).powi(degree as i32),
            KernelType::Rbf { gamma } => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * sq).exp()
            }
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    /// Tolerance for the KKT check
    pub tol: f64,
    /// Maximum number of passes over the data
    pub max_iter: usize,
    pub random_state: u64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::Rbf { gamma: 1.0 },
            tol: 1e-3,
            max_iter: 1000,
            random_state: 42,
        }
    }
}

/// Binary machine separating one class (+1) from the rest (-1)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i per support vector
    coefficients: Array1<f64>,
    bias: f64,
}

impl BinarySVM {
    fn score(&self, kernel: &KernelType, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.coefficients.iter())
            .map(|(sv, coef)| coef * kernel.eval(sample, sv))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    /// One machine for binary targets, one per class otherwise
    machines: Vec<BinarySVM>,
    n_classes: usize,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            machines: Vec::new(),
            n_classes: 0,
        }
    }

    /// Fit on labels `0..n_classes`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(QuantError::InvalidParams(format!(
                "svm supports at most {} training rows, got {}",
                MAX_KERNEL_MATRIX_SAMPLES, n
            )));
        }
        if n < 2 || n != y.len() {
            return Err(QuantError::insufficient("svm", 2, n));
        }

        let kernel_matrix = self.compute_kernel_matrix(x);
        let targets: Vec<usize> = if n_classes <= 2 { vec![1] } else { (0..n_classes).collect() };

        let machines: Vec<BinarySVM> = targets
            .par_iter()
            .map(|&class| {
                let y_signed = y.mapv(|v| if v as usize == class { 1.0 } else { -1.0 });
                self.smo_train(x, &kernel_matrix, &y_signed, class as u64)
            })
            .collect();
        self.machines = machines;
        self.n_classes = n_classes;
        Ok(())
    }

    fn smo_train(&self, x: &Array2<f64>, k: &Array2<f64>, y: &Array1<f64>, seed_offset: u64) -> BinarySVM {
        let n = x.nrows();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.wrapping_add(seed_offset));

        // f(x_i) without bias, kept in sync with alpha updates
        let mut f = Array1::<f64>::zeros(n);

        let mut passes = 0;
        let mut total_iter = 0;
        while passes < 5 && total_iter < self.config.max_iter {
            let mut num_changed = 0;
            for i in 0..n {
                let e_i = f[i] + bias - y[i];
                let violates = (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }
                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = f[j] + bias - y[j];
                let (ai_old, aj_old) = (alphas[i], alphas[j]);

                let (l, h) = if y[i] != y[j] {
                    ((aj_old - ai_old).max(0.0), (c + aj_old - ai_old).min(c))
                } else {
                    ((ai_old + aj_old - c).max(0.0), (ai_old + aj_old).min(c))
                };
                if (h - l).abs() < 1e-10 {
                    continue;
                }
                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let aj = (aj_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (aj - aj_old).abs() < 1e-5 {
                    continue;
                }
                let ai = ai_old + y[i] * y[j] * (aj_old - aj);
                let (di, dj) = (y[i] * (ai - ai_old), y[j] * (aj - aj_old));

                let b1 = bias - e_i - di * k[[i, i]] - dj * k[[i, j]];
                let b2 = bias - e_j - di * k[[i, j]] - dj * k[[j, j]];
                bias = if ai > 0.0 && ai < c {
                    b1
                } else if aj > 0.0 && aj < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                alphas[i] = ai;
                alphas[j] = aj;
                for t in 0..n {
                    f[t] += di * k[[i, t]] + dj * k[[j, t]];
                }
                num_changed += 1;
            }
            total_iter += 1;
            passes = if num_changed == 0 { passes + 1 } else { 0 };
        }

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        let mut support_vectors = Array2::zeros((support.len(), x.ncols()));
        let mut coefficients = Array1::zeros(support.len());
        for (row, &idx) in support.iter().enumerate() {
            support_vectors.row_mut(row).assign(&x.row(idx));
            coefficients[row] = alphas[idx] * y[idx];
        }
        BinarySVM {
            support_vectors,
            coefficients,
            bias,
        }
    }

    fn compute_kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let kernel = self.config.kernel;
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (i..n).map(|j| kernel.eval(x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, val) in row.into_iter().enumerate() {
                k[[i, i + offset]] = val;
                k[[i + offset, i]] = val;
            }
        }
        k
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.machines.is_empty() {
            return Err(QuantError::Computation("svm is not fitted".to_string()));
        }
        let kernel = self.config.kernel;
        let predictions: Vec<f64> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|sample| {
                if self.n_classes <= 2 {
                    if self.machines[0].score(&kernel, *sample) >= 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    self.machines
                        .iter()
                        .enumerate()
                        .fold((0usize, f64::NEG_INFINITY), |best, (c, m)| {
                            let s = m.score(&kernel, *sample);
                            if s > best.1 {
                                (c, s)
                            } else {
                                best
                            }
                        })
                        .0 as f64
                }
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [-2.0, -2.0],
            [-1.5, -2.5],
            [-2.5, -1.0],
            [-1.0, -1.5],
            [2.0, 2.0],
            [1.5, 2.5],
            [2.5, 1.0],
            [1.0, 1.5]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_linear_kernel_separates() {
        let (x, y) = separable();
        let mut svm = SVMClassifier::new(SVMConfig {
            kernel: KernelType::Linear,
            ..Default::default()
        });
        svm.fit(&x, &y, 2).unwrap();
        assert_eq!(svm.predict(&x).unwrap(), y);
        assert!(svm.n_support_vectors() > 0);
    }

    #[test]
    fn test_rbf_kernel_separates() {
        let (x, y) = separable();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        svm.fit(&x, &y, 2).unwrap();
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_one_vs_rest() {
        let x = array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [5.0, 5.0],
            [5.2, 4.9],
            [4.8, 5.1],
            [0.0, 5.0],
            [0.2, 5.2],
            [-0.1, 4.8]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut svm = SVMClassifier::new(SVMConfig {
            kernel: KernelType::Rbf { gamma: 0.5 },
            c: 10.0,
            ..Default::default()
        });
        svm.fit(&x, &y, 3).unwrap();
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_kernel_values() {
        let a = array![1.0, 2.0];
        let b = array![3.0, 4.0];
        assert_eq!(KernelType::Linear.eval(a.view(), b.view()), 11.0);
        let poly = KernelType::Polynomial { degree: 2, gamma: 1.0 };
        assert_eq!(poly.eval(a.view(), b.view()), 144.0);
        let rbf = KernelType::Rbf { gamma: 0.5 };
        assert!((rbf.eval(a.view(), b.view()) - (-4.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_unfitted_predict_fails() {
        let svm = SVMClassifier::new(SVMConfig::default());
        assert!(svm.predict(&array![[1.0, 2.0]]).is_err());
    }
}

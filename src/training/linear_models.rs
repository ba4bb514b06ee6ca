//! Logistic regression

use crate::error::{QuantError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Binary logistic model fitted by gradient descent with an L2 penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryLogit {
    weights: Array1<f64>,
    intercept: f64,
}

impl BinaryLogit {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, alpha: f64, lr: f64, max_iter: usize, tol: f64) -> Self {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut intercept = 0.0;

        for _ in 0..max_iter {
            let linear = x.dot(&weights) + intercept;
            let errors = sigmoid(&linear) - y;
            let dw = x.t().dot(&errors) / n_samples + alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < tol {
                break;
            }
            weights.scaled_add(-lr, &dw);
            intercept -= lr * db;
        }
        Self { weights, intercept }
    }

    fn proba(&self, x: &Array2<f64>) -> Array1<f64> {
        sigmoid(&(x.dot(&self.weights) + self.intercept))
    }
}

fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Logistic regression classifier; one-vs-rest beyond two classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Regularization strength (L2)
    pub alpha: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once the gradient norm drops below this
    pub tol: f64,
    models: Vec<BinaryLogit>,
    n_classes: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            alpha: 0.01,
            learning_rate: 0.1,
            max_iter: 1000,
            tol: 1e-6,
            models: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Fit on labels `0..n_classes`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<&mut Self> {
        if x.nrows() != y.len() || x.nrows() == 0 {
            return Err(QuantError::Computation(format!(
                "logistic regression needs matching non-empty inputs, got {} rows and {} targets",
                x.nrows(),
                y.len()
            )));
        }
        let targets: Vec<usize> = if n_classes <= 2 { vec![1] } else { (0..n_classes).collect() };
        let (alpha, lr, max_iter, tol) = (self.alpha, self.learning_rate, self.max_iter, self.tol);

        let models: Vec<BinaryLogit> = targets
            .par_iter()
            .map(|&class| {
                let y_bin = y.mapv(|v| if v as usize == class { 1.0 } else { 0.0 });
                BinaryLogit::fit(x, &y_bin, alpha, lr, max_iter, tol)
            })
            .collect();
        self.models = models;
        self.n_classes = n_classes;
        Ok(self)
    }

    /// Probability of each class, one row per sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.models.is_empty() {
            return Err(QuantError::Computation("logistic regression is not fitted".to_string()));
        }
        if self.n_classes <= 2 {
            let p1 = self.models[0].proba(x);
            let mut out = Array2::<f64>::zeros((x.nrows(), 2));
            out.column_mut(0).assign(&p1.mapv(|p| 1.0 - p));
            out.column_mut(1).assign(&p1);
            return Ok(out);
        }
        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (c, model) in self.models.iter().enumerate() {
            out.column_mut(c).assign(&model.proba(x));
        }
        for mut row in out.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            }
        }
        Ok(out)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0usize, f64::MIN), |best, (c, &p)| if p > best.1 { (c, p) } else { best })
                    .0 as f64
            })
            .collect())
    }

    /// Coefficients with one row per fitted model
    pub fn coefficients(&self) -> Option<Array2<f64>> {
        let first = self.models.first()?;
        let mut out = Array2::zeros((self.models.len(), first.weights.len()));
        for (row, model) in self.models.iter().enumerate() {
            out.row_mut(row).assign(&model.weights);
        }
        Some(out)
    }

    /// Mean absolute coefficient per feature across fitted models
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        self.coefficients()
            .and_then(|c| c.mapv(f64::abs).mean_axis(Axis(0)))
    }
}

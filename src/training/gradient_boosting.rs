//! Gradient boosted trees for classification
//!
//! Binary targets are fitted with a single log-loss booster; targets with
//! more classes use one booster per class (one-vs-rest) and predict the
//! class with the highest probability.

use ndarray::{Array1, Array2, Axis};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use crate::error::{QuantError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each tree
    pub subsample: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: 42,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Log-loss booster for one positive class
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryBooster {
    initial_log_odds: f64,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl BinaryBooster {
    fn fit(config: &GradientBoostingConfig, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<Self> {
        let n_samples = x.nrows();
        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        let initial_log_odds = (p / (1.0 - p)).ln();
        let mut log_odds = Array1::from_elem(n_samples, initial_log_odds);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let n_sub = ((n_samples as f64 * config.subsample).ceil() as usize).clamp(1, n_samples);

        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut importances = vec![0.0; x.ncols()];

        for round in 0..config.n_estimators {
            let residuals: Array1<f64> = y
                .iter()
                .zip(log_odds.iter())
                .map(|(yi, lo)| yi - sigmoid(*lo))
                .collect();

            let rows: Vec<usize> = if n_sub < n_samples {
                sample(&mut rng, n_samples, n_sub).into_vec()
            } else {
                (0..n_samples).collect()
            };
            let x_sub = x.select(Axis(0), &rows);
            let r_sub = residuals.select(Axis(0), &rows);

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(Some(config.max_depth))
                .with_min_samples_leaf(config.min_samples_leaf)
                .with_random_state(seed.wrapping_add(round as u64));
            tree.fit(&x_sub, &r_sub)?;

            // Newton step per leaf: sum(residual) / sum(p * (1 - p))
            let hessian: Vec<f64> = rows
                .iter()
                .map(|&i| {
                    let p = sigmoid(log_odds[i]);
                    p * (1.0 - p)
                })
                .collect();
            tree.refit_leaves(&x_sub, |leaf_rows| {
                let num: f64 = leaf_rows.iter().map(|&i| r_sub[i]).sum();
                let den: f64 = leaf_rows.iter().map(|&i| hessian[i]).sum();
                if den < 1e-12 {
                    0.0
                } else {
                    num / den
                }
            });

            let update = tree.predict(x)?;
            log_odds.scaled_add(config.learning_rate, &update);

            if let Some(imp) = tree.feature_importances() {
                importances.iter_mut().zip(imp.iter()).for_each(|(acc, v)| *acc += v);
            }
            trees.push(tree);
        }

        Ok(Self {
            initial_log_odds,
            trees,
            importances,
        })
    }

    fn predict_proba(&self, x: &Array2<f64>, learning_rate: f64) -> Result<Array1<f64>> {
        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for tree in &self.trees {
            log_odds.scaled_add(learning_rate, &tree.predict(x)?);
        }
        Ok(log_odds.mapv(sigmoid))
    }
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    boosters: Vec<BinaryBooster>,
    n_classes: usize,
    feature_importances: Vec<f64>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            boosters: Vec::new(),
            n_classes: 0,
            feature_importances: Vec::new(),
        }
    }

    /// Fit on labels `0..n_classes`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        if x.nrows() != y.len() || x.nrows() == 0 {
            return Err(QuantError::Computation(
                "gradient boosting needs matching non-empty inputs".to_string(),
            ));
        }
        let targets: Vec<(usize, Array1<f64>)> = if n_classes <= 2 {
            vec![(1, y.mapv(|v| if v == 1.0 { 1.0 } else { 0.0 }))]
        } else {
            (0..n_classes)
                .map(|c| (c, y.mapv(|v| if v as usize == c { 1.0 } else { 0.0 })))
                .collect()
        };

        let config = &self.config;
        self.boosters = targets
            .par_iter()
            .map(|(class, target)| {
                BinaryBooster::fit(config, x, target, config.random_state.wrapping_add(*class as u64))
            })
            .collect::<Result<_>>()?;
        self.n_classes = n_classes;

        let mut importances = vec![0.0; x.ncols()];
        for booster in &self.boosters {
            importances.iter_mut().zip(&booster.importances).for_each(|(acc, v)| *acc += v);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = importances;
        Ok(())
    }

    /// Probability of each class, one row per sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.boosters.is_empty() {
            return Err(QuantError::Computation("gradient boosting is not fitted".to_string()));
        }
        let lr = self.config.learning_rate;
        if self.n_classes <= 2 {
            let p1 = self.boosters[0].predict_proba(x, lr)?;
            let mut out = Array2::<f64>::zeros((x.nrows(), 2));
            out.column_mut(0).assign(&p1.mapv(|p| 1.0 - p));
            out.column_mut(1).assign(&p1);
            return Ok(out);
        }
        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (c, booster) in self.boosters.iter().enumerate() {
            out.column_mut(c).assign(&booster.predict_proba(x, lr)?);
        }
        for mut row in out.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            }
        }
        Ok(out)
    }

    /// Predict class labels
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

    /// Get feature importances
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[0] + row[1] > 10.0 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    #[test]
    fn test_gradient_boosting_binary() {
        let (x, y) = create_classification_data();
        let config = GradientBoostingConfig {
            n_estimators: 10,
            ..Default::default()
        };
        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y, 2).unwrap();

        let predictions = model.predict(&x).unwrap();
        assert_eq!(predictions.len(), 100);
        let correct = y.iter().zip(predictions.iter()).filter(|(a, b)| a == b).count();
        assert!(correct as f64 / 100.0 > 0.9, "accuracy {}", correct);

        let total: f64 = model.feature_importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_boosting_multiclass() {
        let x = Array2::from_shape_vec((90, 1), (0..90).map(|i| i as f64).collect()).unwrap();
        let y: Array1<f64> = (0..90).map(|i| (i / 30) as f64).collect();
        let config = GradientBoostingConfig {
            n_estimators: 20,
            subsample: 0.8,
            ..Default::default()
        };
        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y, 3).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (90, 3));
        assert!(proba.rows().into_iter().all(|r| (r.sum() - 1.0).abs() < 1e-9));
        let predictions = model.predict(&x).unwrap();
        let correct = y.iter().zip(predictions.iter()).filter(|(a, b)| a == b).count();
        assert!(correct >= 85, "only {} correct", correct);
    }
}

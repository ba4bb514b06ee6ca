//! Random forest classifier

use super::decision_tree::DecisionTree;
use crate::error::{QuantError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged ensemble of decision trees with per-split feature sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub random_state: u64,
    n_classes: usize,
    feature_importances: Option<Array1<f64>>,
}

impl RandomForest {
    pub fn new_classifier(n_estimators: usize, n_classes: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            random_state: 42,
            n_classes: n_classes.max(1),
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Features considered per split: ceil(sqrt(n_features))
    fn max_features(n_features: usize) -> usize {
        ((n_features as f64).sqrt().ceil() as usize).max(1)
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() || n_samples == 0 {
            return Err(QuantError::Computation(format!(
                "random forest needs matching non-empty inputs, got {} rows and {} targets",
                n_samples,
                y.len()
            )));
        }
        let max_features = Self::max_features(x.ncols());

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                let seed = self.random_state.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let rows: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let x_boot = x.select(Axis(0), &rows);
                let y_boot = y.select(Axis(0), &rows);

                let mut tree = DecisionTree::new_classifier(self.n_classes)
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(Some(max_features))
                    .with_random_state(seed);
                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect::<Result<_>>()?;

        let mut importances = Array1::<f64>::zeros(x.ncols());
        for tree in &trees {
            if let Some(imp) = tree.feature_importances() {
                importances += imp;
            }
        }
        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }

        self.trees = trees;
        self.feature_importances = Some(importances);
        Ok(self)
    }

    /// Majority vote across trees; ties go to the lower class
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(QuantError::Computation("random forest is not fitted".to_string()));
        }
        let all: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|t| t.predict(x))
            .collect::<Result<_>>()?;

        Ok((0..x.nrows())
            .map(|i| {
                let mut votes = vec![0usize; self.n_classes];
                for pred in &all {
                    if let Some(v) = votes.get_mut(pred[i] as usize) {
                        *v += 1;
                    }
                }
                votes
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
                    .map(|(c, _)| c as f64)
                    .unwrap_or(0.0)
            })
            .collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

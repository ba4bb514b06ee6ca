//! CART decision tree for classification and regression

use crate::error::{QuantError, Result};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
    /// Variance reduction (regression)
    Mse,
}

/// Running sufficient statistics of the targets on one side of a split
#[derive(Debug, Clone)]
struct SideStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl SideStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, y: f64) {
        self.count += 1;
        self.sum += y;
        self.sq_sum += y * y;
        if let Some(c) = self.class_counts.get_mut(y as usize) {
            *c += 1;
        }
    }

    fn remove(&mut self, y: f64) {
        self.count -= 1;
        self.sum -= y;
        self.sq_sum -= y * y;
        if let Some(c) = self.class_counts.get_mut(y as usize) {
            *c -= 1;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            Criterion::Mse => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at random per split; all when `None`
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: u64,
    /// Zero for regression trees
    n_classes: usize,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl DecisionTree {
    /// Classifier over labels `0..n_classes`
    pub fn new_classifier(n_classes: usize) -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: 42,
            n_classes: n_classes.max(1),
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::Mse,
            n_classes: 0,
            ..Self::new_classifier(1)
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        if self.is_classifier() && criterion != Criterion::Mse {
            self.criterion = criterion;
        }
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn is_classifier(&self) -> bool {
        self.n_classes > 0
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(QuantError::Computation(format!(
                "feature rows ({}) and targets ({}) differ",
                n_samples,
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(QuantError::insufficient("decision tree", 1, 0));
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build(x, y, indices, 0, &mut importances, &mut rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    fn stats_of(&self, y: &Array1<f64>, indices: &[usize]) -> SideStats {
        let mut stats = SideStats::empty(self.n_classes);
        for &i in indices {
            stats.add(y[i]);
        }
        stats
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = self.stats_of(y, &indices);
        let impurity = stats.impurity(self.criterion);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;
        if should_stop {
            return self.leaf(&stats);
        }

        let candidates: Vec<usize> = match self.max_features {
            Some(m) if m < self.n_features => sample(rng, self.n_features, m.max(1)).into_vec(),
            _ => (0..self.n_features).collect(),
        };

        let best = candidates
            .par_iter()
            .filter_map(|&f| self.best_split_for(x, y, &indices, f, &stats, impurity))
            .max_by(|a, b| {
                a.2.partial_cmp(&b.2)
                    .unwrap_or(Ordering::Equal)
                    .then(b.0.cmp(&a.0))
            });

        let Some((feature_idx, threshold, gain)) = best else {
            return self.leaf(&stats);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, feature_idx]] <= threshold);

        importances[feature_idx] += n_samples as f64 * gain;
        let left = Box::new(self.build(x, y, left_idx, depth + 1, importances, rng));
        let right = Box::new(self.build(x, y, right_idx, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Best threshold on one feature by a single sorted sweep
    fn best_split_for(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        feature: usize,
        parent: &SideStats,
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(Ordering::Equal)
        });

        let n = order.len() as f64;
        let mut left = SideStats::empty(self.n_classes);
        let mut right = parent.clone();
        let mut best: Option<(f64, f64)> = None;

        for pos in 0..order.len() - 1 {
            let yi = y[order[pos]];
            left.add(yi);
            right.remove(yi);

            let here = x[[order[pos], feature]];
            let next = x[[order[pos + 1], feature]];
            if here >= next {
                continue;
            }
            if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                continue;
            }

            let weighted = (left.count as f64 * left.impurity(self.criterion)
                + right.count as f64 * right.impurity(self.criterion))
                / n;
            let gain = parent_impurity - weighted;
            if gain > best.map_or(1e-12, |b| b.1) {
                best = Some(((here + next) / 2.0, gain));
            }
        }

        best.map(|(threshold, gain)| (feature, threshold, gain))
    }

    fn leaf(&self, stats: &SideStats) -> TreeNode {
        let value = if self.is_classifier() {
            stats
                .class_counts
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
                .map(|(class, _)| class as f64)
                .unwrap_or(0.0)
        } else if stats.count > 0 {
            stats.sum / stats.count as f64
        } else {
            0.0
        };
        TreeNode::Leaf {
            value,
            n_samples: stats.count,
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| QuantError::Computation("decision tree is not fitted".to_string()))?;
        if x.ncols() != self.n_features {
            return Err(QuantError::Computation(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut node = root;
                loop {
                    match node {
                        TreeNode::Leaf { value, .. } => break *value,
                        TreeNode::Split {
                            feature_idx,
                            threshold,
                            left,
                            right,
                            ..
                        } => {
                            node = if row[*feature_idx] <= *threshold { left } else { right };
                        }
                    }
                }
            })
            .collect())
    }

    /// Replace every leaf value with `f` of the training rows reaching it
    pub fn refit_leaves<F>(&mut self, x: &Array2<f64>, f: F)
    where
        F: Fn(&[usize]) -> f64,
    {
        fn walk<F: Fn(&[usize]) -> f64>(node: &mut TreeNode, x: &Array2<f64>, rows: Vec<usize>, f: &F) {
            match node {
                TreeNode::Leaf { value, .. } => {
                    if !rows.is_empty() {
                        *value = f(&rows);
                    }
                }
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let (l, r): (Vec<usize>, Vec<usize>) = rows
                        .into_iter()
                        .partition(|&i| x[[i, *feature_idx]] <= *threshold);
                    walk(left, x, l, f);
                    walk(right, x, r, f);
                }
            }
        }
        if let Some(root) = self.root.as_mut() {
            walk(root, x, (0..x.nrows()).collect(), &f);
        }
    }

    /// Normalised impurity decrease per feature
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }

    pub fn n_leaves(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}

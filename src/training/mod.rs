//! Model runner
//!
//! Fits one supervised classifier or clustering model on numeric feature
//! columns of the session dataset:
//! - Decision trees and Random Forests
//! - Gradient boosting
//! - Support Vector Machines
//! - Logistic regression
//! - Clustering (KMeans, agglomerative, DBSCAN)
//!
//! Requests are parsed into a closed [`ModelSpec`] with typed parameters and
//! validated against the dataset before any fitting starts.

mod engine;
pub mod clustering;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;
pub mod svm;

pub use clustering::{AgglomerativeClustering, KMeans, Linkage, DBSCAN};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use engine::{fit, ClusteringFit, FitRequest, FitResult, Label, SupervisedFit, DEFAULT_TEST_SPLIT};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use linear_models::LogisticRegression;
pub use metrics::{Averaging, ClassificationMetrics};
pub use random_forest::RandomForest;
pub use svm::{KernelType, SVMClassifier, SVMConfig};

use crate::error::{QuantError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeCriterion {
    #[default]
    Gini,
    Entropy,
}

impl From<TreeCriterion> for Criterion {
    fn from(c: TreeCriterion) -> Self {
        match c {
            TreeCriterion::Gini => Criterion::Gini,
            TreeCriterion::Entropy => Criterion::Entropy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionTreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub criterion: TreeCriterion,
}

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: TreeCriterion::Gini,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvmKernel {
    #[default]
    Rbf,
    Linear,
    #[serde(alias = "polynomial")]
    Poly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SvmParams {
    #[serde(alias = "C")]
    pub c: f64,
    pub kernel: SvmKernel,
    /// Defaults to 1 / n_features
    pub gamma: Option<f64>,
    pub degree: u32,
    pub max_iter: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: SvmKernel::Rbf,
            gamma: None,
            degree: 3,
            max_iter: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticParams {
    pub alpha: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            learning_rate: 0.1,
            max_iter: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KMeansParams {
    #[serde(alias = "k")]
    pub n_clusters: usize,
    pub max_iter: usize,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            max_iter: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HierarchicalParams {
    pub n_clusters: usize,
    pub linkage: Linkage,
}

impl Default for HierarchicalParams {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            linkage: Linkage::Ward,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbscanParams {
    pub eps: f64,
    pub min_samples: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 5,
        }
    }
}

/// A parsed model request
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    DecisionTree(DecisionTreeParams),
    RandomForest(RandomForestParams),
    GradientBoosting(GradientBoostingParams),
    Svm(SvmParams),
    LogisticRegression(LogisticParams),
    KMeans(KMeansParams),
    Hierarchical(HierarchicalParams),
    Dbscan(DbscanParams),
}

impl ModelSpec {
    pub const SUPERVISED: [&'static str; 5] = [
        "decision_tree",
        "random_forest",
        "gradient_boosting",
        "svm",
        "logistic_regression",
    ];

    pub const CLUSTERING: [&'static str; 3] = ["kmeans", "hierarchical", "dbscan"];

    /// Parse a model identifier and its parameters
    pub fn parse(name: &str, params: Option<serde_json::Value>) -> Result<Self> {
        let spec = match name.trim().to_ascii_lowercase().as_str() {
            "decision_tree" => ModelSpec::DecisionTree(parse_params(params)?),
            "random_forest" => ModelSpec::RandomForest(parse_params(params)?),
            "gradient_boosting" => ModelSpec::GradientBoosting(parse_params(params)?),
            "svm" | "svc" => ModelSpec::Svm(parse_params(params)?),
            "logistic_regression" | "logistic" => ModelSpec::LogisticRegression(parse_params(params)?),
            "kmeans" | "k_means" => ModelSpec::KMeans(parse_params(params)?),
            "hierarchical" | "agglomerative" => ModelSpec::Hierarchical(parse_params(params)?),
            "dbscan" => ModelSpec::Dbscan(parse_params(params)?),
            other => return Err(QuantError::UnsupportedModel(other.to_string())),
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(QuantError::InvalidParams(msg.to_string()));
        match self {
            ModelSpec::DecisionTree(p) => {
                if p.max_depth == Some(0) {
                    return invalid("max_depth must be at least 1");
                }
                if p.min_samples_split < 2 || p.min_samples_leaf < 1 {
                    return invalid("min_samples_split must be >= 2 and min_samples_leaf >= 1");
                }
            }
            ModelSpec::RandomForest(p) => {
                if p.n_estimators == 0 || p.max_depth == Some(0) {
                    return invalid("n_estimators and max_depth must be at least 1");
                }
                if p.min_samples_split < 2 || p.min_samples_leaf < 1 {
                    return invalid("min_samples_split must be >= 2 and min_samples_leaf >= 1");
                }
            }
            ModelSpec::GradientBoosting(p) => {
                if p.n_estimators == 0 || p.max_depth == 0 {
                    return invalid("n_estimators and max_depth must be at least 1");
                }
                if !(p.learning_rate > 0.0) || !(p.subsample > 0.0 && p.subsample <= 1.0) {
                    return invalid("learning_rate must be > 0 and subsample in (0, 1]");
                }
            }
            ModelSpec::Svm(p) => {
                if !(p.c > 0.0) || p.gamma.map_or(false, |g| !(g > 0.0)) {
                    return invalid("c and gamma must be positive");
                }
                if p.degree == 0 || p.max_iter == 0 {
                    return invalid("degree and max_iter must be at least 1");
                }
            }
            ModelSpec::LogisticRegression(p) => {
                if p.alpha < 0.0 || !(p.learning_rate > 0.0) || p.max_iter == 0 {
                    return invalid("alpha must be >= 0, learning_rate > 0 and max_iter >= 1");
                }
            }
            ModelSpec::KMeans(p) => {
                if p.n_clusters == 0 || p.max_iter == 0 {
                    return invalid("n_clusters and max_iter must be at least 1");
                }
            }
            ModelSpec::Hierarchical(p) => {
                if p.n_clusters == 0 {
                    return invalid("n_clusters must be at least 1");
                }
            }
            ModelSpec::Dbscan(p) => {
                if !(p.eps > 0.0) || p.min_samples == 0 {
                    return invalid("eps must be positive and min_samples at least 1");
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::DecisionTree(_) => "decision_tree",
            ModelSpec::RandomForest(_) => "random_forest",
            ModelSpec::GradientBoosting(_) => "gradient_boosting",
            ModelSpec::Svm(_) => "svm",
            ModelSpec::LogisticRegression(_) => "logistic_regression",
            ModelSpec::KMeans(_) => "kmeans",
            ModelSpec::Hierarchical(_) => "hierarchical",
            ModelSpec::Dbscan(_) => "dbscan",
        }
    }

    pub fn is_supervised(&self) -> bool {
        !matches!(
            self,
            ModelSpec::KMeans(_) | ModelSpec::Hierarchical(_) | ModelSpec::Dbscan(_)
        )
    }

    /// Models fitted on standardised features
    pub fn needs_scaling(&self) -> bool {
        matches!(self, ModelSpec::Svm(_) | ModelSpec::LogisticRegression(_))
    }

    /// Resolved parameters, defaults filled in
    pub fn params(&self) -> serde_json::Value {
        let value = match self {
            ModelSpec::DecisionTree(p) => serde_json::to_value(p),
            ModelSpec::RandomForest(p) => serde_json::to_value(p),
            ModelSpec::GradientBoosting(p) => serde_json::to_value(p),
            ModelSpec::Svm(p) => serde_json::to_value(p),
            ModelSpec::LogisticRegression(p) => serde_json::to_value(p),
            ModelSpec::KMeans(p) => serde_json::to_value(p),
            ModelSpec::Hierarchical(p) => serde_json::to_value(p),
            ModelSpec::Dbscan(p) => serde_json::to_value(p),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

fn parse_params<T: DeserializeOwned + Default>(params: Option<serde_json::Value>) -> Result<T> {
    match params {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| QuantError::InvalidParams(e.to_string())),
    }
}

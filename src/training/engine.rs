//! Fit pipeline: validation, row filtering, label encoding, split, scaling,
//! training and held-out evaluation

use super::clustering::{AgglomerativeClustering, KMeans, DBSCAN};
use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::linear_models::LogisticRegression;
use super::metrics::ClassificationMetrics;
use super::random_forest::RandomForest;
use super::svm::{KernelType, SVMClassifier, SVMConfig};
use super::{ModelSpec, SvmKernel};
use crate::data::{format_number, ColumnKind, Dataset};
use crate::error::{QuantError, Result};
use crate::preprocessing::StandardScaler;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_TEST_SPLIT: f64 = 0.2;
const SPLIT_SEED: u64 = 42;
const MIN_USABLE_ROWS: usize = 5;
/// Upper bound on distinct target values treated as classes
const MAX_CLASSES: usize = 100;

fn default_test_split() -> f64 {
    DEFAULT_TEST_SPLIT
}

/// Model fit request as received from a client
#[derive(Debug, Clone, Deserialize)]
pub struct FitRequest {
    pub x_columns: Vec<String>,
    #[serde(default)]
    pub y_column: Option<String>,
    pub model: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default = "default_test_split")]
    pub test_split: f64,
}

impl FitRequest {
    pub fn new(x_columns: Vec<String>, y_column: Option<String>, model: impl Into<String>) -> Self {
        Self {
            x_columns,
            y_column,
            model: model.into(),
            params: None,
            test_split: DEFAULT_TEST_SPLIT,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_test_split(mut self, test_split: f64) -> Self {
        self.test_split = test_split;
        self
    }
}

/// Class label in the target column's own type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Label {
    Number(f64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Number(v) => f.write_str(&format_number(*v)),
            Label::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisedFit {
    pub model: &'static str,
    pub params: serde_json::Value,
    pub features: Vec<String>,
    pub target: String,
    /// Class labels in encoded order
    pub classes: Vec<Label>,
    pub n_samples: usize,
    pub rows_dropped: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub scaled: bool,
    pub metrics: ClassificationMetrics,
    /// Sorted by importance, highest first
    pub feature_importance: Option<Vec<FeatureImportance>>,
    pub test_actual: Vec<Label>,
    pub test_predictions: Vec<Label>,
    /// Predictions over every usable row, in dataset order
    pub predictions: Vec<Label>,
    pub training_time_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusteringFit {
    pub model: &'static str,
    pub params: serde_json::Value,
    pub features: Vec<String>,
    pub n_samples: usize,
    pub rows_dropped: usize,
    /// One label per usable row; -1 marks DBSCAN noise
    pub labels: Vec<i64>,
    pub n_clusters: usize,
    pub cluster_sizes: BTreeMap<i64, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inertia: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_points: Option<usize>,
    pub training_time_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum FitResult {
    #[serde(rename = "classification")]
    Supervised(SupervisedFit),
    Clustering(ClusteringFit),
}

impl FitResult {
    pub fn model(&self) -> &'static str {
        match self {
            FitResult::Supervised(r) => r.model,
            FitResult::Clustering(r) => r.model,
        }
    }
}

/// Target values in the column's storage type
enum Target {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Target {
    fn is_present(&self, row: usize) -> bool {
        match self {
            Target::Numeric(v) => v[row].is_some(),
            Target::Text(v) => v[row].is_some(),
        }
    }

    /// Encode the given rows to `0..k` in sorted class order
    fn encode(&self, rows: &[usize]) -> (Vec<Label>, Vec<usize>) {
        match self {
            Target::Numeric(values) => {
                let mut classes: Vec<f64> = rows.iter().filter_map(|&r| values[r]).collect();
                classes.sort_by(f64::total_cmp);
                classes.dedup();
                let encoded = rows
                    .iter()
                    .filter_map(|&r| values[r])
                    .map(|v| classes.partition_point(|c| c.total_cmp(&v).is_lt()))
                    .collect();
                (classes.into_iter().map(Label::Number).collect(), encoded)
            }
            Target::Text(values) => {
                let classes: Vec<&str> = rows
                    .iter()
                    .filter_map(|&r| values[r].as_deref())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let encoded = rows
                    .iter()
                    .filter_map(|&r| values[r].as_deref())
                    .map(|v| classes.partition_point(|c| *c < v))
                    .collect();
                (
                    classes.into_iter().map(|c| Label::Text(c.to_string())).collect(),
                    encoded,
                )
            }
        }
    }
}

/// Fit the requested model. The dataset is only read.
pub fn fit(dataset: &Dataset, request: &FitRequest) -> Result<FitResult> {
    let spec = validate(dataset, request)?;
    let start = Instant::now();

    let features: Vec<Vec<Option<f64>>> = request
        .x_columns
        .iter()
        .map(|c| dataset.numeric(c))
        .collect::<Result<_>>()?;

    if spec.is_supervised() {
        let target_name = request
            .y_column
            .as_deref()
            .ok_or_else(|| QuantError::MissingTarget(spec.name().to_string()))?;
        let target = match dataset.kind(target_name) {
            Some(ColumnKind::Numeric) => Target::Numeric(dataset.numeric(target_name)?),
            _ => Target::Text(dataset.text(target_name)?),
        };
        fit_supervised(dataset, request, &spec, &features, target_name, &target, start)
            .map(FitResult::Supervised)
    } else {
        fit_clustering(dataset, request, &spec, &features, start).map(FitResult::Clustering)
    }
}

/// Every request check, before any data is touched. Returns the parsed model.
fn validate(dataset: &Dataset, request: &FitRequest) -> Result<ModelSpec> {
    if request.x_columns.is_empty() {
        return Err(QuantError::InvalidParams("x_columns must not be empty".to_string()));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = request.x_columns.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(QuantError::InvalidParams(format!("feature '{}' listed twice", dup)));
    }

    let spec = ModelSpec::parse(&request.model, request.params.clone())?;

    // Clustering ignores the target entirely, so only supervised fits check it
    let mut referenced: Vec<&str> = request.x_columns.iter().map(String::as_str).collect();
    if let Some(y) = request.y_column.as_deref().filter(|_| spec.is_supervised()) {
        referenced.push(y);
    }
    dataset.require_columns(&referenced)?;
    dataset.require_numeric(&request.x_columns)?;

    if !(request.test_split > 0.0 && request.test_split < 1.0) {
        return Err(QuantError::InvalidParams(format!(
            "test_split must be between 0 and 1 (exclusive), got {}",
            request.test_split
        )));
    }

    if spec.is_supervised() {
        match request.y_column.as_deref() {
            None => return Err(QuantError::MissingTarget(spec.name().to_string())),
            Some(y) if request.x_columns.iter().any(|c| c == y) => {
                return Err(QuantError::InvalidParams(format!(
                    "target '{}' is also listed as a feature",
                    y
                )));
            }
            Some(_) => {}
        }
    }
    Ok(spec)
}

fn usable_rows(n_rows: usize, features: &[Vec<Option<f64>>], target: Option<&Target>) -> Vec<usize> {
    (0..n_rows)
        .filter(|&r| features.iter().all(|f| f[r].is_some()))
        .filter(|&r| target.map_or(true, |t| t.is_present(r)))
        .collect()
}

fn feature_matrix(features: &[Vec<Option<f64>>], rows: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), features.len()), |(i, j)| {
        features[j][rows[i]].unwrap_or(f64::NAN)
    })
}

/// Seeded shuffle split. Test size is `ceil(n * test_split)`.
fn train_test_split(n: usize, test_split: f64) -> Result<(Vec<usize>, Vec<usize>)> {
    let test_size = ((n as f64 * test_split - 1e-9).ceil() as usize).max(1);
    let train_size = n.saturating_sub(test_size);
    if train_size < 2 {
        return Err(QuantError::insufficient("training split", 2, train_size));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(SPLIT_SEED));
    let train = indices.split_off(test_size);
    Ok((train, indices))
}

#[allow(clippy::too_many_arguments)]
fn fit_supervised(
    dataset: &Dataset,
    request: &FitRequest,
    spec: &ModelSpec,
    features: &[Vec<Option<f64>>],
    target_name: &str,
    target: &Target,
    start: Instant,
) -> Result<SupervisedFit> {
    let rows = usable_rows(dataset.height(), features, Some(target));
    let rows_dropped = dataset.height() - rows.len();
    if rows.len() < MIN_USABLE_ROWS {
        return Err(QuantError::insufficient("model fit", MIN_USABLE_ROWS, rows.len()));
    }

    let (classes, encoded) = target.encode(&rows);
    if classes.len() < 2 {
        return Err(QuantError::insufficient("classification target classes", 2, classes.len()));
    }
    if classes.len() > MAX_CLASSES {
        return Err(QuantError::InvalidParams(format!(
            "target '{}' has {} distinct values; at most {} classes are supported",
            target_name,
            classes.len(),
            MAX_CLASSES
        )));
    }
    let n_classes = classes.len();

    let x_all = feature_matrix(features, &rows);
    let y_all = Array1::from_iter(encoded.iter().map(|&c| c as f64));
    let (train_idx, test_idx) = train_test_split(rows.len(), request.test_split)?;

    let (x_train, x_test, x_all) = {
        let x_train = x_all.select(Axis(0), &train_idx);
        let x_test = x_all.select(Axis(0), &test_idx);
        if spec.needs_scaling() {
            let scaler = StandardScaler::fit(&x_train)?;
            (scaler.transform(&x_train), scaler.transform(&x_test), scaler.transform(&x_all))
        } else {
            (x_train, x_test, x_all)
        }
    };
    let y_train = y_all.select(Axis(0), &train_idx);

    info!(
        model = spec.name(),
        rows = rows.len(),
        features = request.x_columns.len(),
        classes = n_classes,
        train = train_idx.len(),
        test = test_idx.len(),
        "Training classifier"
    );

    let model = Classifier::train(spec, &x_train, &y_train, n_classes)?;
    let test_pred = to_classes(&model.predict(&x_test)?, n_classes);
    let all_pred = to_classes(&model.predict(&x_all)?, n_classes);
    let test_true: Vec<usize> = test_idx.iter().map(|&i| encoded[i]).collect();

    let metrics = ClassificationMetrics::compute(&test_true, &test_pred, n_classes);
    let feature_importance = model.importances().map(|imp| {
        let mut ranked: Vec<FeatureImportance> = request
            .x_columns
            .iter()
            .zip(imp)
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        ranked
    });

    let training_time_ms = start.elapsed().as_millis() as u64;
    info!(
        model = spec.name(),
        accuracy = metrics.accuracy,
        f1 = metrics.f1,
        elapsed_ms = training_time_ms,
        "Classifier trained"
    );

    let label = |c: usize| classes[c].clone();
    Ok(SupervisedFit {
        model: spec.name(),
        params: spec.params(),
        features: request.x_columns.clone(),
        target: target_name.to_string(),
        n_samples: rows.len(),
        rows_dropped,
        train_size: train_idx.len(),
        test_size: test_idx.len(),
        scaled: spec.needs_scaling(),
        metrics,
        feature_importance,
        test_actual: test_true.iter().map(|&c| label(c)).collect(),
        test_predictions: test_pred.iter().map(|&c| label(c)).collect(),
        predictions: all_pred.iter().map(|&c| label(c)).collect(),
        training_time_ms,
        warnings: Vec::new(),
        classes,
    })
}

fn to_classes(predictions: &Array1<f64>, n_classes: usize) -> Vec<usize> {
    predictions
        .iter()
        .map(|&p| (p.max(0.0) as usize).min(n_classes - 1))
        .collect()
}

fn fit_clustering(
    dataset: &Dataset,
    request: &FitRequest,
    spec: &ModelSpec,
    features: &[Vec<Option<f64>>],
    start: Instant,
) -> Result<ClusteringFit> {
    let mut warnings = Vec::new();
    if let Some(y) = request.y_column.as_deref() {
        warn!(model = spec.name(), target = y, "Clustering ignores the target column");
        warnings.push(format!("{} is unsupervised; y_column '{}' was ignored", spec.name(), y));
    }

    let rows = usable_rows(dataset.height(), features, None);
    let rows_dropped = dataset.height() - rows.len();
    if rows.len() < MIN_USABLE_ROWS {
        return Err(QuantError::insufficient("model fit", MIN_USABLE_ROWS, rows.len()));
    }
    let x = feature_matrix(features, &rows);

    info!(
        model = spec.name(),
        rows = rows.len(),
        features = request.x_columns.len(),
        "Fitting clustering model"
    );

    let (labels, inertia, noise_points): (Vec<i64>, Option<f64>, Option<usize>) = match spec {
        ModelSpec::KMeans(p) => {
            let mut model = KMeans::new(p.n_clusters).with_max_iter(p.max_iter);
            model.fit(&x)?;
            let labels = model.labels().iter().map(|&l| l as i64).collect();
            (labels, model.inertia(), None)
        }
        ModelSpec::Hierarchical(p) => {
            let mut model = AgglomerativeClustering::new(p.n_clusters, p.linkage);
            model.fit(&x)?;
            (model.labels().iter().map(|&l| l as i64).collect(), None, None)
        }
        ModelSpec::Dbscan(p) => {
            let mut model = DBSCAN::new(p.eps, p.min_samples);
            model.fit(&x)?;
            (model.labels().to_vec(), None, Some(model.n_noise()))
        }
        other => {
            return Err(QuantError::UnsupportedModel(format!(
                "{} is not a clustering model",
                other.name()
            )))
        }
    };

    let mut cluster_sizes = BTreeMap::new();
    for &l in &labels {
        *cluster_sizes.entry(l).or_insert(0usize) += 1;
    }
    let n_clusters = cluster_sizes.keys().filter(|&&l| l >= 0).count();
    let training_time_ms = start.elapsed().as_millis() as u64;
    info!(model = spec.name(), n_clusters, elapsed_ms = training_time_ms, "Clustering done");

    Ok(ClusteringFit {
        model: spec.name(),
        params: spec.params(),
        features: request.x_columns.clone(),
        n_samples: rows.len(),
        rows_dropped,
        labels,
        n_clusters,
        cluster_sizes,
        inertia,
        noise_points,
        training_time_ms,
        warnings,
    })
}

/// Fitted supervised model
enum Classifier {
    Tree(DecisionTree),
    Forest(RandomForest),
    Boosting(GradientBoostingClassifier),
    Svm(SVMClassifier),
    Logistic(LogisticRegression),
}

impl Classifier {
    fn train(spec: &ModelSpec, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<Self> {
        let model = match spec {
            ModelSpec::DecisionTree(p) => {
                let mut tree = DecisionTree::new_classifier(n_classes)
                    .with_max_depth(p.max_depth)
                    .with_min_samples_split(p.min_samples_split)
                    .with_min_samples_leaf(p.min_samples_leaf)
                    .with_criterion(p.criterion.into());
                tree.fit(x, y)?;
                Classifier::Tree(tree)
            }
            ModelSpec::RandomForest(p) => {
                let mut forest = RandomForest::new_classifier(p.n_estimators, n_classes)
                    .with_max_depth(p.max_depth)
                    .with_min_samples_split(p.min_samples_split)
                    .with_min_samples_leaf(p.min_samples_leaf);
                forest.fit(x, y)?;
                Classifier::Forest(forest)
            }
            ModelSpec::GradientBoosting(p) => {
                let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
                    n_estimators: p.n_estimators,
                    learning_rate: p.learning_rate,
                    max_depth: p.max_depth,
                    subsample: p.subsample,
                    ..Default::default()
                });
                model.fit(x, y, n_classes)?;
                Classifier::Boosting(model)
            }
            ModelSpec::Svm(p) => {
                let gamma = p.gamma.unwrap_or(1.0 / x.ncols().max(1) as f64);
                let kernel = match p.kernel {
                    SvmKernel::Linear => KernelType::Linear,
                    SvmKernel::Rbf => KernelType::Rbf { gamma },
                    SvmKernel::Poly => KernelType::Polynomial {
                        degree: p.degree,
                        gamma,
                    },
                };
                let mut model = SVMClassifier::new(SVMConfig {
                    c: p.c,
                    kernel,
                    max_iter: p.max_iter,
                    ..Default::default()
                });
                model.fit(x, y, n_classes)?;
                Classifier::Svm(model)
            }
            ModelSpec::LogisticRegression(p) => {
                let mut model = LogisticRegression::new()
                    .with_alpha(p.alpha)
                    .with_learning_rate(p.learning_rate)
                    .with_max_iter(p.max_iter);
                model.fit(x, y, n_classes)?;
                Classifier::Logistic(model)
            }
            other => {
                return Err(QuantError::UnsupportedModel(format!(
                    "{} is not a supervised model",
                    other.name()
                )))
            }
        };
        Ok(model)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Classifier::Tree(m) => m.predict(x),
            Classifier::Forest(m) => m.predict(x),
            Classifier::Boosting(m) => m.predict(x),
            Classifier::Svm(m) => m.predict(x),
            Classifier::Logistic(m) => m.predict(x),
        }
    }

    fn importances(&self) -> Option<Vec<f64>> {
        match self {
            Classifier::Tree(m) => m.feature_importances().map(|a| a.to_vec()),
            Classifier::Forest(m) => m.feature_importances().map(|a| a.to_vec()),
            Classifier::Boosting(m) => Some(m.feature_importances().to_vec()),
            Classifier::Svm(_) => None,
            Classifier::Logistic(m) => m.feature_importances().map(|a| a.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::load_bytes;
    use serde_json::json;

    fn dataset(rows: usize) -> Dataset {
        let mut csv = String::from("a,b,label,kind\n");
        for i in 0..rows {
            let a = i as f64;
            let b = (i % 7) as f64;
            let label = if i < rows / 2 { 0 } else { 1 };
            let kind = if i % 3 == 0 { "x" } else { "y" };
            csv.push_str(&format!("{},{},{},{}\n", a, b, label, kind));
        }
        load_bytes(csv.as_bytes(), "train.csv").unwrap()
    }

    fn request(model: &str, y: Option<&str>) -> FitRequest {
        FitRequest::new(
            vec!["a".to_string(), "b".to_string()],
            y.map(str::to_string),
            model,
        )
    }

    #[test]
    fn test_decision_tree_fifty_rows() {
        let ds = dataset(50);
        let result = fit(&ds, &request("decision_tree", Some("label"))).unwrap();
        let FitResult::Supervised(fit) = result else {
            panic!("expected supervised result");
        };
        assert_eq!(fit.test_size, 10);
        assert_eq!(fit.train_size, 40);
        assert_eq!(fit.test_predictions.len(), 10);
        assert_eq!(fit.predictions.len(), 50);
        assert!((0.0..=1.0).contains(&fit.metrics.accuracy));
        assert_eq!(fit.classes, vec![Label::Number(0.0), Label::Number(1.0)]);
        let importance = fit.feature_importance.unwrap();
        assert_eq!(importance[0].feature, "a");
    }

    #[test]
    fn test_every_supervised_model_runs() {
        let ds = dataset(60);
        for name in ModelSpec::SUPERVISED {
            let req = request(name, Some("label")).with_params(match name {
                "random_forest" | "gradient_boosting" => json!({"n_estimators": 10}),
                _ => json!({}),
            });
            let result = fit(&ds, &req).unwrap();
            assert_eq!(result.model(), name);
            let FitResult::Supervised(fit) = result else {
                panic!("expected supervised result");
            };
            assert_eq!(fit.test_size, 12);
            assert_eq!(fit.scaled, name == "svm" || name == "logistic_regression");
            assert_eq!(fit.feature_importance.is_none(), name == "svm");
        }
    }

    #[test]
    fn test_text_target_labels() {
        let ds = dataset(40);
        let result = fit(&ds, &request("random_forest", Some("kind")).with_params(json!({"n_estimators": 5})))
            .unwrap();
        let FitResult::Supervised(fit) = result else {
            panic!("expected supervised result");
        };
        assert_eq!(
            fit.classes,
            vec![Label::Text("x".to_string()), Label::Text("y".to_string())]
        );
        assert!(fit.predictions.iter().all(|l| matches!(l, Label::Text(_))));
    }

    #[test]
    fn test_validation_errors() {
        let ds = dataset(20);
        let err = fit(&ds, &request("decision_tree", None)).unwrap_err();
        assert_eq!(err.kind(), "missing_target");

        let err = fit(&ds, &request("neural_net", Some("label"))).unwrap_err();
        assert_eq!(err.kind(), "unsupported_model");

        let mut req = request("decision_tree", Some("label"));
        req.x_columns.push("nope".to_string());
        assert_eq!(fit(&ds, &req).unwrap_err().kind(), "column_not_found");

        let mut req = request("decision_tree", Some("label"));
        req.x_columns.push("kind".to_string());
        assert_eq!(fit(&ds, &req).unwrap_err().kind(), "type_mismatch");

        let req = request("decision_tree", Some("label")).with_test_split(1.0);
        assert_eq!(fit(&ds, &req).unwrap_err().kind(), "invalid_params");

        let req = request("decision_tree", Some("a"));
        assert_eq!(fit(&ds, &req).unwrap_err().kind(), "invalid_params");
    }

    #[test]
    fn test_missing_rows_are_dropped() {
        let csv = "a,b,label\n1,2,0\n2,,0\n3,4,0\n4,5,1\n5,6,1\n6,7,1\n7,8,\n8,9,0\n";
        let ds = load_bytes(csv.as_bytes(), "gaps.csv").unwrap();
        let result = fit(&ds, &request("decision_tree", Some("label")).with_test_split(0.3)).unwrap();
        let FitResult::Supervised(fit) = result else {
            panic!("expected supervised result");
        };
        assert_eq!(fit.rows_dropped, 2);
        assert_eq!(fit.n_samples, 6);
        assert_eq!(fit.test_size, 2);
    }

    #[test]
    fn test_too_few_rows() {
        let ds = dataset(4);
        let err = fit(&ds, &request("kmeans", None)).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_single_class_target() {
        let csv = "a,b,label\n1,2,1\n2,3,1\n3,4,1\n4,5,1\n5,6,1\n6,7,1\n";
        let ds = load_bytes(csv.as_bytes(), "one.csv").unwrap();
        let err = fit(&ds, &request("decision_tree", Some("label"))).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_clustering_ignores_target() {
        let ds = dataset(30);
        let result = fit(&ds, &request("kmeans", Some("label"))).unwrap();
        let FitResult::Clustering(fit) = result else {
            panic!("expected clustering result");
        };
        assert_eq!(fit.labels.len(), 30);
        assert_eq!(fit.n_clusters, 3);
        assert_eq!(fit.cluster_sizes.values().sum::<usize>(), 30);
        assert!(fit.inertia.is_some());
        assert_eq!(fit.warnings.len(), 1);
    }

    #[test]
    fn test_clustering_ignores_absent_target() {
        let ds = dataset(30);
        let FitResult::Clustering(fit) = fit(&ds, &request("kmeans", Some("nope"))).unwrap() else {
            panic!("expected clustering result");
        };
        assert_eq!(fit.labels.len(), 30);
        assert_eq!(fit.warnings.len(), 1);
        assert!(fit.warnings[0].contains("nope"));

        let err = fit_err(&ds, "decision_tree", "nope");
        assert_eq!(err.kind(), "column_not_found");
    }

    fn fit_err(ds: &Dataset, model: &str, target: &str) -> QuantError {
        fit(ds, &request(model, Some(target))).unwrap_err()
    }

    #[test]
    fn test_dbscan_reports_noise() {
        let csv = "a,b\n0,0\n0.1,0\n0,0.1\n0.1,0.1\n5,5\n5.1,5\n5,5.1\n5.1,5.1\n40,40\n";
        let ds = load_bytes(csv.as_bytes(), "pts.csv").unwrap();
        let req = request("dbscan", None).with_params(json!({"eps": 0.5, "min_samples": 3}));
        let FitResult::Clustering(fit) = fit(&ds, &req).unwrap() else {
            panic!("expected clustering result");
        };
        assert_eq!(fit.n_clusters, 2);
        assert_eq!(fit.noise_points, Some(1));
        assert_eq!(fit.labels[8], -1);
        assert_eq!(fit.cluster_sizes[&-1], 1);
    }

    #[test]
    fn test_hierarchical_groups() {
        let csv = "a,b\n0,0\n0.2,0.1\n0.1,0.3\n9,9\n9.2,9.1\n8.9,9.3\n";
        let ds = load_bytes(csv.as_bytes(), "pts.csv").unwrap();
        let req = request("hierarchical", None).with_params(json!({"n_clusters": 2}));
        let FitResult::Clustering(fit) = fit(&ds, &req).unwrap() else {
            panic!("expected clustering result");
        };
        assert_eq!(fit.labels, vec![0, 0, 0, 1, 1, 1]);
        assert!(fit.inertia.is_none());
    }

    #[test]
    fn test_result_serializes_with_task_tag() {
        let ds = dataset(30);
        let result = fit(&ds, &request("kmeans", None)).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["task"], "clustering");
        assert_eq!(value["model"], "kmeans");
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = train_test_split(50, 0.2).unwrap();
        assert_eq!((train.len(), test.len()), (40, 10));
        let (train, test) = train_test_split(7, 0.3).unwrap();
        assert_eq!((train.len(), test.len()), (4, 3));
        assert!(train_test_split(5, 0.9).is_err());
    }
}

//! Integration test: model fitting end-to-end

use polars::prelude::*;
use quantlab::data::{from_frame, Dataset};
use quantlab::training::{fit, FitRequest, FitResult, Label, ModelSpec};
use serde_json::json;

/// Three well separated blobs of 20 points, labelled by blob
fn blobs() -> Dataset {
    let centers = [(0.0, 0.0, "alpha"), (10.0, 10.0, "beta"), (20.0, 0.0, "gamma")];
    let mut f1 = Vec::new();
    let mut f2 = Vec::new();
    let mut label = Vec::new();
    for i in 0..20 {
        for &(cx, cy, name) in &centers {
            let dx = ((i * 7) % 11) as f64 / 10.0 - 0.5;
            let dy = ((i * 3) % 7) as f64 / 6.0 - 0.5;
            f1.push(cx + dx);
            f2.push(cy + dy);
            label.push(name);
        }
    }
    let df = df!("f1" => &f1, "f2" => &f2, "species" => &label).unwrap();
    from_frame("blobs", &df).unwrap()
}

fn features() -> Vec<String> {
    vec!["f1".to_string(), "f2".to_string()]
}

fn supervised(model: &str) -> quantlab::training::SupervisedFit {
    let request = FitRequest::new(features(), Some("species".to_string()), model);
    match fit(&blobs(), &request).unwrap() {
        FitResult::Supervised(fit) => fit,
        FitResult::Clustering(_) => panic!("{} should be supervised", model),
    }
}

#[test]
fn test_every_classifier_separates_blobs() {
    for model in ModelSpec::SUPERVISED {
        let result = supervised(model);
        assert_eq!(result.model, model);
        assert_eq!(result.n_samples, 60);
        assert_eq!(result.test_size, 12);
        assert_eq!(result.train_size, 48);
        assert_eq!(result.predictions.len(), 60);
        assert_eq!(
            result.classes,
            vec![
                Label::Text("alpha".into()),
                Label::Text("beta".into()),
                Label::Text("gamma".into())
            ]
        );
        assert!(
            result.metrics.accuracy >= 0.8,
            "{} accuracy {}",
            model,
            result.metrics.accuracy
        );
    }
}

#[test]
fn test_tree_models_report_importance() {
    for model in ["decision_tree", "random_forest", "gradient_boosting"] {
        let result = supervised(model);
        let importance = result.feature_importance.expect("tree importance");
        assert_eq!(importance.len(), 2);
        assert!(importance[0].importance >= importance[1].importance);
    }
    assert!(supervised("svm").feature_importance.is_none());
}

#[test]
fn test_scaling_flag() {
    assert!(supervised("logistic_regression").scaled);
    assert!(!supervised("random_forest").scaled);
}

#[test]
fn test_missing_rows_are_dropped() {
    let df = df!(
        "x" => &[Some(1.0), Some(2.0), None, Some(4.0), Some(5.0), Some(6.0), Some(7.0), Some(8.0), Some(9.0), Some(10.0)],
        "y" => &[Some(0i64), Some(0), Some(0), None, Some(0), Some(1), Some(1), Some(1), Some(1), Some(1)],
    )
    .unwrap();
    let ds = from_frame("gaps", &df).unwrap();
    let request = FitRequest::new(vec!["x".into()], Some("y".into()), "decision_tree");
    match fit(&ds, &request).unwrap() {
        FitResult::Supervised(result) => {
            assert_eq!(result.rows_dropped, 2);
            assert_eq!(result.n_samples, 8);
            assert_eq!(result.classes, vec![Label::Number(0.0), Label::Number(1.0)]);
        }
        other => panic!("unexpected {:?}", other.model()),
    }
}

#[test]
fn test_request_validation() {
    let ds = blobs();
    let err = fit(&ds, &FitRequest::new(features(), None, "svm")).unwrap_err();
    assert_eq!(err.kind(), "missing_target");

    let err = fit(&ds, &FitRequest::new(vec!["species".into()], None, "kmeans")).unwrap_err();
    assert_eq!(err.kind(), "type_mismatch");

    let err = fit(&ds, &FitRequest::new(vec!["f9".into()], None, "kmeans")).unwrap_err();
    assert_eq!(err.kind(), "column_not_found");

    let request = FitRequest::new(features(), Some("species".into()), "random_forest").with_test_split(1.0);
    assert_eq!(fit(&ds, &request).unwrap_err().kind(), "invalid_params");

    let request = FitRequest::new(features(), Some("species".into()), "knn");
    assert_eq!(fit(&ds, &request).unwrap_err().kind(), "unsupported_model");
}

#[test]
fn test_kmeans_finds_blobs() {
    let request = FitRequest::new(features(), None, "kmeans").with_params(json!({ "n_clusters": 3 }));
    match fit(&blobs(), &request).unwrap() {
        FitResult::Clustering(result) => {
            assert_eq!(result.n_clusters, 3);
            assert_eq!(result.labels.len(), 60);
            assert_eq!(result.cluster_sizes.len(), 3);
            assert_eq!(result.cluster_sizes.values().sum::<usize>(), 60);
            assert!(result.inertia.unwrap() > 0.0);
            assert!(result.noise_points.is_none());
        }
        FitResult::Supervised(_) => panic!("kmeans is unsupervised"),
    }
}

#[test]
fn test_hierarchical_and_dbscan_agree_on_blobs() {
    let request = FitRequest::new(features(), None, "hierarchical")
        .with_params(json!({ "n_clusters": 3, "linkage": "average" }));
    let hierarchical = match fit(&blobs(), &request).unwrap() {
        FitResult::Clustering(result) => result,
        FitResult::Supervised(_) => panic!("hierarchical is unsupervised"),
    };
    assert_eq!(hierarchical.n_clusters, 3);

    let request = FitRequest::new(features(), Some("species".into()), "dbscan")
        .with_params(json!({ "eps": 2.0, "min_samples": 3 }));
    let dbscan = match fit(&blobs(), &request).unwrap() {
        FitResult::Clustering(result) => result,
        FitResult::Supervised(_) => panic!("dbscan is unsupervised"),
    };
    assert_eq!(dbscan.n_clusters, 3);
    assert_eq!(dbscan.noise_points, Some(0));
    assert_eq!(dbscan.warnings.len(), 1);

    // Same partition, possibly different numbering
    for i in 0..60 {
        for j in 0..60 {
            let same_h = hierarchical.labels[i] == hierarchical.labels[j];
            let same_d = dbscan.labels[i] == dbscan.labels[j];
            assert_eq!(same_h, same_d);
        }
    }
}

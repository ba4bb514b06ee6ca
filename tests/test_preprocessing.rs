//! Integration test: column transforms end-to-end

use polars::prelude::*;
use quantlab::data::{from_frame, ColumnKind, Dataset};
use quantlab::preprocessing::{apply, TransformSpec};
use quantlab::stats::{mean, present, sample_std};
use serde_json::json;

fn sample_dataset() -> Dataset {
    let df = df!(
        "age" => &[25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0],
        "income" => &[Some(30000.0), Some(45000.0), None, Some(70000.0), Some(80000.0),
                      Some(90000.0), None, Some(110000.0), Some(120000.0), Some(130000.0)],
        "city" => &["paris", "rome", "paris", "oslo", "rome", "paris", "oslo", "rome", "paris", "oslo"],
        "rating" => &[1i64, 2, 3, 1, 2, 3, 1, 2, 3, 1],
    )
    .unwrap();
    from_frame("people", &df).unwrap()
}

fn run(dataset: &mut Dataset, column: &str, name: &str, params: Option<serde_json::Value>) -> quantlab::Result<quantlab::preprocessing::TransformSummary> {
    let spec = TransformSpec::parse(name, params)?;
    apply(dataset, column, &spec)
}

#[test]
fn test_frame_kinds() {
    let ds = sample_dataset();
    assert_eq!(ds.kind("age"), Some(ColumnKind::Numeric));
    assert_eq!(ds.kind("rating"), Some(ColumnKind::Numeric));
    assert_eq!(ds.kind("city"), Some(ColumnKind::Categorical));
}

#[test]
fn test_normalize_gives_unit_variance() {
    let mut ds = sample_dataset();
    let summary = run(&mut ds, "age", "normalize", None).unwrap();
    assert_eq!(summary.transformation, "normalize");

    let values = present(&ds.numeric("age").unwrap());
    assert!(mean(&values).unwrap().abs() < 1e-12);
    assert!((sample_std(&values).unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn test_scale_to_unit_range_keeps_missing() {
    let mut ds = sample_dataset();
    let summary = run(&mut ds, "income", "scale", None).unwrap();
    let after = summary.after.unwrap();
    assert_eq!(after.min, Some(0.0));
    assert_eq!(after.max, Some(1.0));
    assert_eq!(after.null_count, 2);
}

#[test]
fn test_scale_rejects_inverted_range() {
    let mut ds = sample_dataset();
    let before = ds.numeric("age").unwrap();
    let err = run(&mut ds, "age", "scale", Some(json!({ "feature_range": [1, 0] }))).unwrap_err();
    assert_eq!(err.kind(), "invalid_params");
    assert_eq!(ds.numeric("age").unwrap(), before);
}

#[test]
fn test_one_hot_replaces_column_in_place() {
    let mut ds = sample_dataset();
    let summary = run(&mut ds, "city", "one_hot_encode", None).unwrap();
    assert_eq!(summary.columns_removed, vec!["city"]);
    assert_eq!(summary.columns_added, vec!["city_oslo", "city_paris", "city_rome"]);
    assert_eq!(
        ds.headers(),
        vec!["age", "income", "city_oslo", "city_paris", "city_rome", "rating"]
    );
    assert_eq!(ds.kind("city_paris"), Some(ColumnKind::Numeric));
    let paris = present(&ds.numeric("city_paris").unwrap());
    assert_eq!(paris.iter().sum::<f64>(), 4.0);
}

#[test]
fn test_one_hot_low_cardinality_numeric() {
    let mut ds = sample_dataset();
    let summary = run(&mut ds, "rating", "one_hot_encode", None).unwrap();
    assert_eq!(summary.columns_added, vec!["rating_1", "rating_2", "rating_3"]);

    let err = run(&mut ds, "age", "one_hot_encode", None).unwrap_err();
    assert_eq!(err.kind(), "type_mismatch");
}

#[test]
fn test_binning_inserts_after_original() {
    let mut ds = sample_dataset();
    let summary = run(&mut ds, "age", "binning", Some(json!({ "bins": 3 }))).unwrap();
    assert_eq!(summary.columns_added, vec!["age_binned"]);
    assert_eq!(ds.headers()[1], "age_binned");
    assert_eq!(ds.kind("age_binned"), Some(ColumnKind::Categorical));
    assert_eq!(ds.kind("age"), Some(ColumnKind::Numeric));
}

#[test]
fn test_fillna_constant_and_type_checks() {
    let mut ds = sample_dataset();
    run(&mut ds, "income", "fillna", Some(json!({ "method": "constant", "value": 0 }))).unwrap();
    let income = ds.numeric("income").unwrap();
    assert!(income.iter().all(Option::is_some));
    assert_eq!(income[2], Some(0.0));

    let err = run(&mut ds, "city", "fillna", Some(json!({ "method": "mean" }))).unwrap_err();
    assert_eq!(err.kind(), "type_mismatch");
}

#[test]
fn test_unknown_transform_and_params() {
    let mut ds = sample_dataset();
    let err = run(&mut ds, "age", "sqrt", None).unwrap_err();
    assert_eq!(err.kind(), "unsupported_transform");
    let err = run(&mut ds, "age", "log", Some(json!({ "base": 10 }))).unwrap_err();
    assert_eq!(err.kind(), "invalid_params");
    let err = run(&mut ds, "city", "normalize", None).unwrap_err();
    assert_eq!(err.kind(), "type_mismatch");
    let err = run(&mut ds, "nope", "normalize", None).unwrap_err();
    assert_eq!(err.kind(), "column_not_found");
    assert_eq!(ds.width(), 4);
}

#[test]
fn test_one_hot_rejects_datetime() {
    let df = df!(
        "when" => &["2024-01-01", "2024-01-02", "2024-01-01"],
        "v" => &[1.0, 2.0, 3.0],
    )
    .unwrap();
    let mut ds = from_frame("dated", &df).unwrap();
    assert_eq!(ds.kind("when"), Some(ColumnKind::DateTime));

    let err = run(&mut ds, "when", "one_hot_encode", None).unwrap_err();
    assert_eq!(err.kind(), "type_mismatch");
    assert_eq!(ds.headers(), vec!["when", "v"]);
}

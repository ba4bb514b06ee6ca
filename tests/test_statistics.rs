//! Integration test: statistics and correlation

use polars::prelude::*;
use quantlab::data::{from_frame, load_bytes, Dataset};
use quantlab::stats::{column_stats, correlate, summarize, ColumnStats, CorrelationMethod};

fn market_dataset() -> Dataset {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        "y" => &[2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0],
        "z" => &[8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0],
        "sector" => &["tech", "tech", "energy", "tech", "energy", "retail", "tech", "energy"],
        "day" => &["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04",
                   "2024-01-05", "2024-01-08", "2024-01-09", "2024-01-10"],
    )
    .unwrap();
    from_frame("market", &df).unwrap()
}

#[test]
fn test_summary_splits_numeric_and_categorical() {
    let ds = market_dataset();
    let summary = summarize(&ds, None).unwrap();
    assert_eq!(summary.row_count, 8);
    assert_eq!(summary.numeric_stats.len(), 3);
    assert_eq!(summary.categorical_stats.len(), 2);

    let x = &summary.numeric_stats["x"];
    assert_eq!(x.count, 8);
    assert_eq!(x.mean, Some(4.5));
    assert_eq!(x.median, Some(4.5));
    assert_eq!(x.min, Some(1.0));
    assert_eq!(x.max, Some(8.0));
    assert_eq!(x.sum, 36.0);

    let sector = &summary.categorical_stats["sector"];
    assert_eq!(sector.most_frequent.as_deref(), Some("tech"));
    assert_eq!(sector.most_frequent_share, Some(0.5));
    assert_eq!(sector.frequencies[0].count, 4);
    assert_eq!(sector.frequencies[1].value, "energy");

    let day = &summary.categorical_stats["day"];
    assert_eq!(day.kind.as_str(), "datetime");
}

#[test]
fn test_summary_unknown_columns() {
    let ds = market_dataset();
    let err = summarize(&ds, Some(&["x".to_string(), "q".to_string(), "r".to_string()])).unwrap_err();
    assert_eq!(err.kind(), "column_not_found");
    assert!(err.to_string().contains('q') && err.to_string().contains('r'));
}

#[test]
fn test_column_stats_single_entry() {
    let ds = market_dataset();
    match column_stats(&ds, "y").unwrap() {
        ColumnStats::Numeric(s) => assert_eq!(s.mean, Some(9.0)),
        other => panic!("expected numeric stats, got {:?}", other),
    }
}

#[test]
fn test_correlation_matrix_shape() {
    let ds = market_dataset();
    let result = correlate(&ds, None, CorrelationMethod::Pearson).unwrap();
    assert_eq!(result.columns, vec!["x", "y", "z"]);
    assert_eq!(result.pairs.len(), 3);
    let entries: usize = result.matrix.values().map(|row| row.len()).sum();
    assert_eq!(entries, 9);
    for a in &result.columns {
        assert_eq!(result.matrix[a][a], Some(1.0));
        for b in &result.columns {
            assert_eq!(result.matrix[a][b], result.matrix[b][a]);
        }
    }
    let xy = result.matrix["x"]["y"].unwrap();
    let xz = result.matrix["x"]["z"].unwrap();
    assert!((xy - 1.0).abs() < 1e-12);
    assert!((xz + 1.0).abs() < 1e-12);
    assert_eq!(result.pairs[0].strength, Some("very strong"));
}

#[test]
fn test_rank_methods_agree_on_monotone_data() {
    let ds = market_dataset();
    for method in [CorrelationMethod::Spearman, CorrelationMethod::Kendall] {
        let result = correlate(&ds, Some(&["x".to_string(), "z".to_string()]), method).unwrap();
        let r = result.pairs[0].correlation.unwrap();
        assert!((r + 1.0).abs() < 1e-12, "{:?}: {}", method, r);
    }
}

#[test]
fn test_correlation_rejects_non_numeric() {
    let ds = market_dataset();
    let cols = vec!["x".to_string(), "sector".to_string(), "day".to_string()];
    let err = correlate(&ds, Some(&cols), CorrelationMethod::Pearson).unwrap_err();
    assert_eq!(err.kind(), "type_mismatch");
    assert!(err.to_string().contains("sector") && err.to_string().contains("day"));

    let err = correlate(&ds, Some(&["x".to_string()]), CorrelationMethod::Pearson).unwrap_err();
    assert_eq!(err.kind(), "invalid_params");
}

#[test]
fn test_constant_column_gives_null_coefficient() {
    let ds = load_bytes(b"a,b\n1,5\n2,5\n3,5\n", "flat.csv").unwrap();
    let result = correlate(&ds, None, CorrelationMethod::Pearson).unwrap();
    assert_eq!(result.pairs[0].correlation, None);
    assert_eq!(result.pairs[0].strength, None);
    assert_eq!(result.matrix["a"]["a"], Some(1.0));
}

//! Classification metrics

use serde::Serialize;

/// How precision, recall and F1 are aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Averaging {
    /// Scores of the positive class (encoded label 1)
    Binary,
    /// Per-class scores weighted by support
    Weighted,
}

/// Held-out evaluation of a classifier
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub averaging: Averaging,
    pub n_samples: usize,
    /// Rows are true classes, columns predicted classes
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl ClassificationMetrics {
    /// Compute metrics over encoded labels `0..n_classes`. Binary scoring
    /// is used for at most two classes, weighted averaging otherwise.
    pub fn compute(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Self {
        let k = n_classes.max(2);
        let mut confusion = vec![vec![0usize; k]; k];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t < k && p < k {
                confusion[t][p] += 1;
            }
        }

        let n = y_true.len();
        let correct: usize = (0..k).map(|c| confusion[c][c]).sum();
        let accuracy = if n > 0 { correct as f64 / n as f64 } else { 0.0 };

        let per_class = |c: usize| -> (f64, f64, f64, usize) {
            let tp = confusion[c][c];
            let predicted: usize = (0..k).map(|t| confusion[t][c]).sum();
            let support: usize = confusion[c].iter().sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            (precision, recall, f1, support)
        };

        let (averaging, precision, recall, f1) = if n_classes <= 2 {
            let (p, r, f, _) = per_class(1);
            (Averaging::Binary, p, r, f)
        } else {
            let (mut p, mut r, mut f) = (0.0, 0.0, 0.0);
            for c in 0..k {
                let (pc, rc, fc, support) = per_class(c);
                let w = if n > 0 { support as f64 / n as f64 } else { 0.0 };
                p += w * pc;
                r += w * rc;
                f += w * fc;
            }
            (Averaging::Weighted, p, r, f)
        };

        Self {
            accuracy,
            precision,
            recall,
            f1,
            averaging,
            n_samples: n,
            confusion_matrix: confusion,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_metrics() {
        let y_true = [1, 0, 1, 1, 0, 1, 0, 0];
        let y_pred = [1, 0, 1, 0, 0, 1, 1, 0];
        let m = ClassificationMetrics::compute(&y_true, &y_pred, 2);
        assert_eq!(m.averaging, Averaging::Binary);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert!((m.f1 - 0.75).abs() < 1e-12);
        assert_eq!(m.confusion_matrix, vec![vec![3, 1], vec![1, 3]]);
    }

    #[test]
    fn test_weighted_metrics() {
        let y_true = [0, 0, 1, 1, 2, 2];
        let y_pred = [0, 0, 1, 2, 2, 2];
        let m = ClassificationMetrics::compute(&y_true, &y_pred, 3);
        assert_eq!(m.averaging, Averaging::Weighted);
        assert!((m.accuracy - 5.0 / 6.0).abs() < 1e-12);
        // class 2: precision 2/3 recall 1; class 1: precision 1 recall 1/2
        let expected_precision = (1.0 + 1.0 + 2.0 / 3.0) / 3.0;
        assert!((m.precision - expected_precision).abs() < 1e-12);
        assert!((m.recall - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_scores_zero() {
        let m = ClassificationMetrics::compute(&[0, 0], &[0, 0], 2);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 1.0);
    }
}

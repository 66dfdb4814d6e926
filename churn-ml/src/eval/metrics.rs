//! Binary classification metrics. Class 1 is the positive class throughout.

use churn_core::ChurnError;
use serde::{Deserialize, Serialize};
use std::fmt;

fn check_lengths(a: usize, b: usize) -> Result<(), ChurnError> {
    if a != b {
        return Err(ChurnError::evaluation(format!(
            "length mismatch: {a} labels vs {b} predictions"
        )));
    }
    if a == 0 {
        return Err(ChurnError::evaluation("no samples to evaluate"));
    }
    Ok(())
}

/// 2×2 confusion matrix, rows = true label, columns = predicted label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Result<Self, ChurnError> {
        check_lengths(y_true.len(), y_pred.len())?;
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (0, 0) => cm.tn += 1,
                (0, 1) => cm.fp += 1,
                (1, 0) => cm.fn_ += 1,
                (1, 1) => cm.tp += 1,
                _ => {
                    return Err(ChurnError::evaluation(format!(
                        "labels must be 0 or 1, got ({t}, {p})"
                    )));
                }
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

/// Matrix layout with every cell padded to the widest value:
/// `[[3 0]\n [0 2]]`.
impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = [self.tn, self.fp, self.fn_, self.tp]
            .iter()
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(1);
        write!(
            f,
            "[[{:>w$} {:>w$}]\n [{:>w$} {:>w$}]]",
            self.tn,
            self.fp,
            self.fn_,
            self.tp,
            w = width
        )
    }
}

pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> Result<f64, ChurnError> {
    check_lengths(y_true.len(), y_pred.len())?;
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// `num / den`, or 0 with a warning when `den` is 0.
pub(crate) fn ratio_or_zero(num: usize, den: usize, metric: &str) -> f64 {
    if den == 0 {
        tracing::warn!(metric, "Ill-defined metric set to 0.0 (no samples in denominator)");
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn precision(y_true: &[u8], y_pred: &[u8]) -> Result<f64, ChurnError> {
    let cm = ConfusionMatrix::from_predictions(y_true, y_pred)?;
    Ok(ratio_or_zero(cm.tp, cm.tp + cm.fp, "precision"))
}

pub fn recall(y_true: &[u8], y_pred: &[u8]) -> Result<f64, ChurnError> {
    let cm = ConfusionMatrix::from_predictions(y_true, y_pred)?;
    Ok(ratio_or_zero(cm.tp, cm.tp + cm.fn_, "recall"))
}

pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// ROC curve points. `thresholds[0]` is `+∞`, where nothing is predicted
/// positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    pub fn auc(&self) -> f64 {
        trapezoid(&self.fpr, &self.tpr)
    }
}

/// Area under a piecewise-linear curve given by monotone `x`.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// ROC curve over the distinct score thresholds, with points that lie on a
/// straight segment between their neighbours dropped.
///
/// Fails with [`ChurnError::Evaluation`] unless both classes are present.
pub fn roc_curve(y_true: &[u8], scores: &[f64]) -> Result<RocCurve, ChurnError> {
    check_lengths(y_true.len(), scores.len())?;
    if scores.iter().any(|s| s.is_nan()) {
        return Err(ChurnError::evaluation("scores contain NaN"));
    }
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ChurnError::evaluation(
            "only one class present in y_true; ROC AUC is undefined",
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable, so equal scores keep input order.
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    // Cumulative counts at the last index of each distinct score.
    let mut tps = Vec::new();
    let mut fps = Vec::new();
    let mut thresholds = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &idx) in order.iter().enumerate() {
        if y_true[idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_run = order
            .get(k + 1)
            .is_none_or(|&next| scores[next] != scores[idx]);
        if last_of_run {
            tps.push(tp as f64);
            fps.push(fp as f64);
            thresholds.push(scores[idx]);
        }
    }

    // Drop collinear interior points.
    let n = tps.len();
    let keep: Vec<usize> = (0..n)
        .filter(|&i| {
            if i == 0 || i + 1 == n {
                return true;
            }
            let d2_fp = fps[i + 1] - 2.0 * fps[i] + fps[i - 1];
            let d2_tp = tps[i + 1] - 2.0 * tps[i] + tps[i - 1];
            d2_fp != 0.0 || d2_tp != 0.0
        })
        .collect();

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    for i in keep {
        curve.fpr.push(fps[i] / negatives as f64);
        curve.tpr.push(tps[i] / positives as f64);
        curve.thresholds.push(thresholds[i]);
    }
    Ok(curve)
}

pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Result<f64, ChurnError> {
    Ok(roc_curve(y_true, scores)?.auc())
}

/// Fold scores with their mean and population standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub metric_name: String,
}

impl CrossValidationResult {
    /// A NaN fold makes the mean NaN.
    pub fn from_scores(scores: Vec<f64>, metric_name: &str) -> Self {
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            fold_scores: scores,
            mean_score: mean,
            std_score: variance.sqrt(),
            metric_name: metric_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_confusion_matrix_layout() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 0, 1, 1], &[0, 0, 0, 1, 1]).unwrap();
        assert_eq!(cm.as_rows(), [[3, 0], [0, 2]]);
        assert_eq!(cm.to_string(), "[[3 0]\n [0 2]]");

        let wide = ConfusionMatrix {
            tn: 12,
            fp: 3,
            fn_: 0,
            tp: 105,
        };
        assert_eq!(wide.to_string(), "[[ 12   3]\n [  0 105]]");
    }

    #[test]
    fn test_precision_recall() {
        let y_true = [0, 1, 1, 0, 1];
        let y_pred = [0, 1, 0, 1, 1];
        assert!((precision(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((recall(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(accuracy(&y_true, &y_pred).unwrap(), 0.6);
    }

    #[test]
    fn test_zero_division_is_zero() {
        assert_eq!(precision(&[0, 1], &[0, 0]).unwrap(), 0.0);
        assert_eq!(recall(&[0, 0], &[0, 1]).unwrap(), 0.0);
    }

    #[test]
    fn test_roc_curve_matches_reference() {
        // Classic example: y = [1, 1, 2, 2] with scores [0.1, 0.4, 0.35, 0.8].
        let y = [0, 0, 1, 1];
        let scores = [0.1, 0.4, 0.35, 0.8];
        let curve = roc_curve(&y, &scores).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
        assert_eq!(curve.thresholds[0], f64::INFINITY);
        assert_eq!(&curve.thresholds[1..], &[0.8, 0.4, 0.35, 0.1]);
        assert_eq!(curve.auc(), 0.75);
    }

    #[test]
    fn test_roc_drops_collinear_points() {
        let y = [1, 1, 1, 0, 0, 0];
        let scores = [0.9, 0.8, 0.7, 0.3, 0.2, 0.1];
        let curve = roc_curve(&y, &scores).unwrap();
        // The first threshold is always kept; the interior run along tpr = 1 is not.
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(curve.tpr[2..], [1.0, 1.0]);
        assert_eq!(curve.thresholds.len(), 4);
        assert_eq!(curve.auc(), 1.0);
    }

    #[test]
    fn test_roc_ties_share_a_point() {
        let curve = roc_curve(&[0, 1, 0, 1], &[0.5, 0.5, 0.5, 0.5]).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 1.0]);
        assert_eq!(curve.auc(), 0.5);
    }

    #[test]
    fn test_roc_single_class_is_error() {
        assert!(matches!(
            roc_auc(&[1, 1], &[0.2, 0.9]),
            Err(ChurnError::Evaluation(_))
        ));
    }

    #[test]
    fn test_cv_result_stats() {
        let r = CrossValidationResult::from_scores(vec![1.0, 0.5], "accuracy");
        assert_eq!(r.mean_score, 0.75);
        assert_eq!(r.std_score, 0.25);
        let r = CrossValidationResult::from_scores(vec![1.0, f64::NAN], "roc_auc");
        assert!(r.mean_score.is_nan());
    }
}

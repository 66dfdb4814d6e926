//! Text classification report: per-class precision, recall, F1 and support,
//! then accuracy, macro average and support-weighted average.

use super::metrics::{ConfusionMatrix, f1, ratio_or_zero};
use churn_core::ChurnError;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

const DIGITS: usize = 2;
const HEADERS: [&str; 4] = ["precision", "recall", "f1-score", "support"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRow {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassRow>,
    pub accuracy: f64,
    pub macro_avg: ClassRow,
    pub weighted_avg: ClassRow,
}

impl ClassificationReport {
    /// Rows cover the labels that occur in either `y_true` or `y_pred`.
    pub fn new(y_true: &[u8], y_pred: &[u8]) -> Result<Self, ChurnError> {
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred)?;
        let total = cm.total();

        let mut classes = Vec::new();
        for label in 0..2u8 {
            // Counts seen from this label's point of view.
            let (tp, fp, fn_) = if label == 1 {
                (cm.tp, cm.fp, cm.fn_)
            } else {
                (cm.tn, cm.fn_, cm.fp)
            };
            let support = tp + fn_;
            let predicted = tp + fp;
            if support == 0 && predicted == 0 {
                continue;
            }
            let precision = ratio_or_zero(tp, predicted, "precision");
            let recall = ratio_or_zero(tp, support, "recall");
            classes.push(ClassRow {
                label: label.to_string(),
                precision,
                recall,
                f1: f1(precision, recall),
                support,
            });
        }

        let n = classes.len() as f64;
        let macro_avg = ClassRow {
            label: "macro avg".to_string(),
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
            support: total,
        };
        let weight = |value: fn(&ClassRow) -> f64| -> f64 {
            classes
                .iter()
                .map(|c| value(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassRow {
            label: "weighted avg".to_string(),
            precision: weight(|c| c.precision),
            recall: weight(|c| c.recall),
            f1: weight(|c| c.f1),
            support: total,
        };

        Ok(Self {
            accuracy: (cm.tp + cm.tn) as f64 / total as f64,
            classes,
            macro_avg,
            weighted_avg,
        })
    }

    pub fn render(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain(["weighted avg".len(), DIGITS])
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = write!(out, "{:>width$} ", "");
        for header in HEADERS {
            let _ = write!(out, " {header:>9}");
        }
        out.push_str("\n\n");

        let row = |out: &mut String, r: &ClassRow| {
            let _ = writeln!(
                out,
                "{:>width$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
                r.label,
                r.precision,
                r.recall,
                r.f1,
                r.support,
                d = DIGITS
            );
        };
        for class in &self.classes {
            row(&mut out, class);
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "{:>width$}  {:>9} {:>9} {:>9.d$} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support,
            d = DIGITS
        );
        row(&mut out, &self.macro_avg);
        row(&mut out, &self.weighted_avg);
        out
    }
}

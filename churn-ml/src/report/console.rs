//! Fixed-format console report, one block per model.

use crate::training::ModelResult;
use std::fmt::Write as _;
use std::io;

const SEPARATOR_WIDTH: usize = 60;
const MAX_FRACTION_DIGITS: usize = 8;

/// The block printed for one model, ending with the dash separator line.
pub fn format_model_block(result: &ModelResult) -> String {
    let roc_auc = match result.roc_auc {
        Some(auc) => format!("{auc:?}"),
        None => "None".to_string(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "Model: {}", result.name);
    let _ = writeln!(out, "Accuracy: {:?}", result.accuracy);
    let _ = writeln!(out, "Precision: {:?}", result.precision);
    let _ = writeln!(out, "Recall: {:?}", result.recall);
    let _ = writeln!(out, "ROC AUC: {roc_auc}");
    let _ = writeln!(out, "Confusion Matrix:");
    let _ = writeln!(out, "{}", result.confusion_matrix);
    let _ = writeln!(out, "Classification Report:");
    let _ = writeln!(out, "{}", result.classification_report);
    let _ = writeln!(
        out,
        "Cross Validation Scores: {}",
        format_score_array(&result.cv_scores)
    );
    let _ = writeln!(out, "{}", "-".repeat(SEPARATOR_WIDTH));
    out
}

/// Print every block in order.
pub fn print_report(results: &[ModelResult], out: &mut impl io::Write) -> io::Result<()> {
    for result in results {
        out.write_all(format_model_block(result).as_bytes())?;
    }
    out.flush()
}

/// Array layout with aligned decimal points: `[1.  1.  0.8 1. ]`.
///
/// Each value is printed with the fewest digits (at most eight after the
/// point); integer parts are right-aligned and fractional parts padded with
/// spaces to the widest one.
pub fn format_score_array(values: &[f64]) -> String {
    let parts: Vec<Option<(String, String)>> = values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                return None;
            }
            let fixed = format!("{v:.prec$}", prec = MAX_FRACTION_DIGITS);
            let trimmed = fixed.trim_end_matches('0');
            let (int, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
            Some((int.to_string(), frac.to_string()))
        })
        .collect();

    let int_width = parts.iter().flatten().map(|(i, _)| i.len()).max().unwrap_or(0);
    let frac_width = parts.iter().flatten().map(|(_, f)| f.len()).max().unwrap_or(0);
    let cell_width = (int_width + 1 + frac_width).max(3);

    let cells: Vec<String> = values
        .iter()
        .zip(&parts)
        .map(|(v, part)| match part {
            Some((int, frac)) => {
                format!("{int:>int_width$}.{frac:<frac_width$}")
            }
            None => {
                let text = if v.is_nan() {
                    "nan"
                } else if *v > 0.0 {
                    "inf"
                } else {
                    "-inf"
                };
                format!("{text:>cell_width$}")
            }
        })
        .collect();
    format!("[{}]", cells.join(" "))
}

//! Evaluation metrics and reports.

pub mod classification_report;
pub mod metrics;

pub use classification_report::ClassificationReport;
pub use metrics::{
    ConfusionMatrix, CrossValidationResult, RocCurve, accuracy, precision, recall, roc_auc,
    roc_curve,
};

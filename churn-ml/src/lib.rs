//! # churn-ml
//!
//! The training half of the churn pipelines: five classifier families behind
//! one [`Classifier`](algorithms::Classifier) trait, the train/test split,
//! stratified folds and grid search, held-out evaluation metrics, and the
//! console and ROC-figure reporter.

pub mod algorithms;
pub mod eval;
pub mod pipeline;
pub mod report;
pub mod training;

// Re-exports
pub use algorithms::{Classifier, ModelFamily, ModelParams};
pub use pipeline::{run_training, train_with};
pub use training::{ModelResult, ModelTrainer};

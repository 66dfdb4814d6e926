//! Model selection: feature extraction, train/test split, stratified folds,
//! grid search and the per-family trainer.

pub mod cross_validation;
pub mod features;
pub mod search;
pub mod split;
pub mod trainer;

pub use cross_validation::{Fold, stratified_kfold};
pub use features::FeatureMatrix;
pub use search::{CandidateScore, FoldMetric, GridSearch, SearchOutcome};
pub use split::{SplitIndices, train_test_split};
pub use trainer::{ModelResult, ModelTrainer};

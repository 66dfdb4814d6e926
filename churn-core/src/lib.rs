//! # churn-core
//!
//! Shared foundation for the churn pipelines: configuration, the explicit
//! pipeline context, object storage, the columnar dataset model, and the
//! preprocessing pipeline (load → transform → sink). Also hosts the churn
//! event notifier that forwards inference results to a webhook and the
//! alarm notifier that relays CloudWatch alarms to Slack.

pub mod alarms;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod storage;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::{ChurnConfig, load_config};
pub use context::PipelineContext;
pub use data::{Dataset, TransformPipeline};
pub use error::ChurnError;
pub use pipeline::run_preprocess;
pub use storage::{InMemoryObjectStore, LocalObjectStore, ObjectStore, StorageLocation};

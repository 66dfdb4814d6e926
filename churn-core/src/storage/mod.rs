//! Object storage: bucket + key addressing over pluggable backends.
//!
//! Keys behave like S3 keys: flat strings, listed in lexicographic order, with
//! "directories" being nothing more than shared prefixes.

mod local;
mod memory;

pub use local::LocalObjectStore;
pub use memory::InMemoryObjectStore;

use crate::error::ChurnError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bucket and key prefix, e.g. `s3a://churn-data/preprocessed/accounts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Prefix normalized to end with `/`, so `data` never matches `data-old/`.
    pub fn dir_prefix(&self) -> String {
        let trimmed = self.prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        }
    }

    /// Key of an object directly under this location.
    pub fn child_key(&self, name: &str) -> String {
        format!("{}{name}", self.dir_prefix())
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3a://{}/{}", self.bucket, self.prefix.trim_matches('/'))
    }
}

/// Trait for object storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List keys in `bucket` starting with `prefix`, in lexicographic order.
    ///
    /// Fails with [`ChurnError::StorageAccess`] if the bucket does not exist.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ChurnError>;

    /// Fetch one object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ChurnError>;

    /// Store one object, replacing any previous value at `key`.
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), ChurnError>;

    /// Delete every object whose key starts with `prefix`; returns how many.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, ChurnError>;

    /// Backend name for logs.
    fn backend_type(&self) -> &'static str;
}

//! In-memory object store, used by tests and dry runs.

use crate::error::ChurnError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// In-memory object store; a `BTreeMap` per bucket keeps listing ordered.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, Bytes>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that already has the given buckets.
    pub fn with_buckets<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let buckets = names
            .into_iter()
            .map(|n| (n.to_string(), BTreeMap::new()))
            .collect();
        Self {
            buckets: RwLock::new(buckets),
        }
    }

    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }
}

fn no_bucket(bucket: &str) -> ChurnError {
    ChurnError::storage(format!("bucket '{bucket}' does not exist"))
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ChurnError> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| no_bucket(bucket))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ChurnError> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| no_bucket(bucket))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| ChurnError::storage(format!("object s3a://{bucket}/{key} not found")))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), ChurnError> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_bucket(bucket))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, ChurnError> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_bucket(bucket))?;
        let before = objects.len();
        objects.retain(|k, _| !k.starts_with(prefix));
        Ok(before - objects.len())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_list_range() {
        let store = InMemoryObjectStore::with_buckets(["b"]);
        for key in ["p/2", "p/1", "q/1", "o/9"] {
            store.put("b", key, Bytes::from_static(b"x")).await.unwrap();
        }
        assert_eq!(store.list("b", "p/").await.unwrap(), vec!["p/1", "p/2"]);
        assert_eq!(store.list("b", "").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_memory_missing_bucket() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.put("nope", "k", Bytes::new()).await,
            Err(ChurnError::StorageAccess(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_delete_prefix() {
        let store = InMemoryObjectStore::with_buckets(["b"]);
        store.put("b", "out/1", Bytes::new()).await.unwrap();
        store.put("b", "out/2", Bytes::new()).await.unwrap();
        store.put("b", "in/1", Bytes::new()).await.unwrap();
        assert_eq!(store.delete_prefix("b", "out/").await.unwrap(), 2);
        assert_eq!(store.list("b", "").await.unwrap(), vec!["in/1"]);
    }
}

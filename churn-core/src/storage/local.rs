//! Local filesystem object store: one directory per bucket.

use crate::error::ChurnError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Object store rooted at a local directory.
///
/// `root/<bucket>/<key>` holds each object. Buckets must exist before use,
/// mirroring object stores where buckets are provisioned out of band.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the bucket directory if missing.
    pub async fn create_bucket(&self, bucket: &str) -> Result<(), ChurnError> {
        tokio::fs::create_dir_all(self.bucket_path(bucket)?).await?;
        Ok(())
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, ChurnError> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(ChurnError::storage(format!("invalid bucket name '{bucket}'")));
        }
        Ok(self.root.join(bucket))
    }

    fn existing_bucket(&self, bucket: &str) -> Result<PathBuf, ChurnError> {
        let path = self.bucket_path(bucket)?;
        if !path.is_dir() {
            return Err(ChurnError::storage(format!(
                "bucket '{bucket}' does not exist under {}",
                self.root.display()
            )));
        }
        Ok(path)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ChurnError> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ChurnError::storage(format!("invalid object key '{key}'")));
        }
        Ok(self.existing_bucket(bucket)?.join(relative))
    }
}

fn key_of(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ChurnError> {
        let bucket_dir = self.existing_bucket(bucket)?;
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            for entry in WalkDir::new(&bucket_dir).follow_links(false) {
                let entry = entry.map_err(|e| ChurnError::storage(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(key) = key_of(&bucket_dir, entry.path()) {
                    if key.starts_with(&prefix) {
                        keys.push(key);
                    }
                }
            }
            keys.sort();
            Ok::<_, ChurnError>(keys)
        })
        .await?
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ChurnError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ChurnError::storage(
                format!("object s3a://{bucket}/{key} not found"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), ChurnError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, ChurnError> {
        let keys = self.list(bucket, prefix).await?;
        for key in &keys {
            tokio::fs::remove_file(self.object_path(bucket, key)?).await?;
        }
        Ok(keys.len())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

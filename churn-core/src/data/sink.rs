//! Overwrite-mode parquet writer.

use crate::context::PipelineContext;
use crate::data::columnar::encode_parquet;
use crate::data::dataset::Dataset;
use crate::error::ChurnError;
use crate::storage::StorageLocation;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Marker object written after the data file.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// What a sink write produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkReport {
    pub location: StorageLocation,
    pub data_key: String,
    pub rows: usize,
    pub bytes_written: usize,
    pub replaced_objects: usize,
}

/// Writes a dataset as a partition directory, replacing whatever was there.
///
/// The old objects are deleted before the new file is written, so a failure
/// mid-write leaves the location empty or partially written. There is no
/// staging area.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetSink;

impl ParquetSink {
    pub fn new() -> Self {
        Self
    }

    pub async fn write(
        &self,
        ctx: &PipelineContext,
        dataset: &Dataset,
        location: &StorageLocation,
    ) -> Result<SinkReport, ChurnError> {
        let encoded = encode_parquet(dataset)?;
        let store = ctx.store();
        let prefix = location.dir_prefix();

        let replaced_objects = store.delete_prefix(&location.bucket, &prefix).await?;
        if replaced_objects > 0 {
            tracing::debug!(location = %location, replaced_objects, "Cleared previous output");
        }

        let data_key = location.child_key(&format!(
            "part-00000-{}.snappy.parquet",
            uuid::Uuid::new_v4()
        ));
        let bytes_written = encoded.len();
        store.put(&location.bucket, &data_key, encoded).await?;
        store
            .put(
                &location.bucket,
                &location.child_key(SUCCESS_MARKER),
                Bytes::new(),
            )
            .await?;

        tracing::info!(
            location = %location,
            rows = dataset.row_count(),
            bytes_written,
            "Wrote dataset"
        );
        Ok(SinkReport {
            location: location.clone(),
            data_key,
            rows: dataset.row_count(),
            bytes_written,
            replaced_objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChurnConfig;
    use crate::data::columnar::decode_parquet;
    use crate::data::dataset::reference_records;
    use crate::storage::{InMemoryObjectStore, ObjectStore};
    use std::sync::Arc;

    fn context(store: Arc<InMemoryObjectStore>) -> PipelineContext {
        PipelineContext::with_store(ChurnConfig::default(), store)
    }

    #[tokio::test]
    async fn test_write_layout() {
        let store = Arc::new(InMemoryObjectStore::with_buckets(["out"]));
        let ctx = context(Arc::clone(&store));
        let ds = Dataset::from_records(&reference_records());
        let loc = StorageLocation::new("out", "accounts");

        let report = ParquetSink::new().write(&ctx, &ds, &loc).await.unwrap();
        assert_eq!(report.rows, 5);
        assert_eq!(report.replaced_objects, 0);

        let keys = store.list("out", "accounts/").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], "accounts/_SUCCESS");
        assert!(keys[1].starts_with("accounts/part-00000-"));
        assert!(keys[1].ends_with(".snappy.parquet"));

        let back = decode_parquet(store.get("out", &report.data_key).await.unwrap()).unwrap();
        assert_eq!(back, ds);
    }

    #[tokio::test]
    async fn test_write_overwrites_previous_output() {
        let store = Arc::new(InMemoryObjectStore::with_buckets(["out"]));
        store
            .put("out", "accounts/part-old.parquet", Bytes::from_static(b"x"))
            .await
            .unwrap();
        store
            .put("out", "accounts-archive/keep", Bytes::from_static(b"y"))
            .await
            .unwrap();
        let ctx = context(Arc::clone(&store));
        let ds = Dataset::from_records(&reference_records());
        let loc = StorageLocation::new("out", "accounts");

        let sink = ParquetSink::new();
        sink.write(&ctx, &ds, &loc).await.unwrap();
        let report = sink.write(&ctx, &ds, &loc).await.unwrap();
        assert_eq!(report.replaced_objects, 2);

        let keys = store.list("out", "accounts/").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(!keys.iter().any(|k| k.contains("part-old")));
        // Sibling prefixes are untouched.
        assert_eq!(store.list("out", "accounts-archive/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_storage_error() {
        let store = Arc::new(InMemoryObjectStore::new());
        let ctx = context(store);
        let ds = Dataset::from_records(&reference_records());
        let err = ParquetSink::new()
            .write(&ctx, &ds, &StorageLocation::new("nope", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChurnError::StorageAccess(_)));
    }
}

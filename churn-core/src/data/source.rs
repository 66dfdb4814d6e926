//! Data sources feeding the pipelines.

use crate::context::PipelineContext;
use crate::data::columnar::decode_parquet;
use crate::data::dataset::{AccountRecord, Dataset, reference_records};
use crate::error::ChurnError;
use crate::storage::StorageLocation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Information about a data source, logged at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for loading a dataset.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self, ctx: &PipelineContext) -> Result<Dataset, ChurnError>;

    fn source_info(&self) -> DataSourceInfo;
}

// ---------------------------------------------------------------------------
// SyntheticSource
// ---------------------------------------------------------------------------

/// Fixed in-process records; defaults to the five reference accounts.
pub struct SyntheticSource {
    records: Vec<AccountRecord>,
}

impl SyntheticSource {
    pub fn new(records: Vec<AccountRecord>) -> Self {
        Self { records }
    }

    pub fn reference() -> Self {
        Self::new(reference_records())
    }
}

#[async_trait]
impl DataSource for SyntheticSource {
    async fn load(&self, _ctx: &PipelineContext) -> Result<Dataset, ChurnError> {
        Ok(Dataset::from_records(&self.records))
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "synthetic".to_string(),
            location: format!("{} in-memory records", self.records.len()),
            accessed_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectStoreSource
// ---------------------------------------------------------------------------

/// All `.parquet` partitions under a storage location, concatenated in
/// listing order.
pub struct ObjectStoreSource {
    pub location: StorageLocation,
}

impl ObjectStoreSource {
    pub fn new(location: StorageLocation) -> Self {
        Self { location }
    }
}

#[async_trait]
impl DataSource for ObjectStoreSource {
    async fn load(&self, ctx: &PipelineContext) -> Result<Dataset, ChurnError> {
        let store = ctx.store();
        let keys: Vec<String> = store
            .list(&self.location.bucket, &self.location.dir_prefix())
            .await?
            .into_iter()
            .filter(|k| k.ends_with(".parquet"))
            .collect();
        if keys.is_empty() {
            return Err(ChurnError::storage(format!(
                "no parquet files under {}",
                self.location
            )));
        }

        let mut parts = Vec::with_capacity(keys.len());
        for key in &keys {
            let data = store.get(&self.location.bucket, key).await?;
            let part = decode_parquet(data)?;
            tracing::debug!(key = %key, rows = part.row_count(), "Read partition");
            parts.push(part);
        }
        let dataset = Dataset::concat(parts)?;
        tracing::info!(
            location = %self.location,
            files = keys.len(),
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "parquet".to_string(),
            location: self.location.to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

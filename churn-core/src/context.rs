//! Explicit pipeline context: storage handle and fit permits, opened once per
//! run and passed by reference to every stage that needs them.

use crate::config::{ChurnConfig, StorageBackend};
use crate::error::ChurnError;
use crate::storage::{InMemoryObjectStore, LocalObjectStore, ObjectStore};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct PipelineContext {
    config: ChurnConfig,
    store: Arc<dyn ObjectStore>,
    fit_permits: Arc<Semaphore>,
    run_id: uuid::Uuid,
    closed: bool,
}

impl PipelineContext {
    /// Open a context with the object store selected by `config.storage`.
    pub fn open(config: ChurnConfig) -> Result<Self, ChurnError> {
        config.validate()?;
        let store: Arc<dyn ObjectStore> = match config.storage.backend {
            StorageBackend::Local => Arc::new(LocalObjectStore::new(config.storage.root.clone())),
            // Dry runs start with every configured bucket present and empty.
            StorageBackend::Memory => Arc::new(InMemoryObjectStore::with_buckets([
                config.preprocess.input.bucket.as_str(),
                config.preprocess.output.bucket.as_str(),
                config.training.dataset.bucket.as_str(),
                config.events.bucket.as_str(),
            ])),
        };
        Ok(Self::with_store(config, store))
    }

    /// Open a context over an already constructed store.
    pub fn with_store(config: ChurnConfig, store: Arc<dyn ObjectStore>) -> Self {
        let permits = config.training.max_parallel_fits.max(1);
        let run_id = uuid::Uuid::new_v4();
        tracing::info!(
            run_id = %run_id,
            backend = store.backend_type(),
            fit_permits = permits,
            "Pipeline context opened"
        );
        Self {
            config,
            store,
            fit_permits: Arc::new(Semaphore::new(permits)),
            run_id,
            closed: false,
        }
    }

    pub fn config(&self) -> &ChurnConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Wait for a model-fit slot; the slot is released when the permit drops.
    pub async fn acquire_fit_permit(&self) -> Result<OwnedSemaphorePermit, ChurnError> {
        Arc::clone(&self.fit_permits)
            .acquire_owned()
            .await
            .map_err(|_| ChurnError::invalid_input("pipeline context is closed"))
    }

    /// Tear the context down. Pending permit waiters fail instead of hanging.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.fit_permits.close();
        tracing::info!(run_id = %self.run_id, "Pipeline context closed");
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("run_id", &self.run_id)
            .field("backend", &self.store.backend_type())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> ChurnConfig {
        let mut config = ChurnConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.training.max_parallel_fits = 2;
        config
    }

    #[tokio::test]
    async fn test_open_selects_backend() {
        let ctx = PipelineContext::open(memory_config()).unwrap();
        assert_eq!(ctx.store().backend_type(), "memory");
        ctx.close();
    }

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let ctx = PipelineContext::open(memory_config()).unwrap();
        let a = ctx.acquire_fit_permit().await.unwrap();
        let _b = ctx.acquire_fit_permit().await.unwrap();
        assert_eq!(ctx.fit_permits.available_permits(), 0);
        drop(a);
        assert_eq!(ctx.fit_permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_closed_context_refuses_permits() {
        let mut ctx = PipelineContext::open(memory_config()).unwrap();
        ctx.release();
        assert!(ctx.acquire_fit_permit().await.is_err());
    }

    #[test]
    fn test_open_validates_config() {
        let mut config = memory_config();
        config.training.cv_folds = 0;
        assert!(PipelineContext::open(config).is_err());
    }
}

//! Phase state registry: durable, cached record of every workflow instance.
//!
//! Reads go through a `moka` cache and fall back to the [`PhaseStore`]. Writes go
//! to the store first; a failed write invalidates the cached entry so the next
//! read sees whatever the store actually holds.

pub mod file;
pub mod memory;
pub mod store;

#[cfg(feature = "database")]
pub mod database;

pub use file::JsonFileStore;
pub use memory::MemoryPhaseStore;
pub use store::{PhaseStore, StoreError};

#[cfg(any(test, feature = "testing"))]
pub use store::MockPhaseStore;

#[cfg(feature = "database")]
pub use database::SqlitePhaseStore;

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, StorageBackend, StorageConfig};
use crate::workflow::{PhaseProgress, ProgressSnapshot, TransitionRecord, WorkflowId, WorkflowInstance};

/// Open the store selected by the storage configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn PhaseStore>, StoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryPhaseStore::new())),
        StorageBackend::File => Ok(Arc::new(JsonFileStore::new(config.directory.clone()))),
        #[cfg(feature = "database")]
        StorageBackend::Sqlite => Ok(Arc::new(
            SqlitePhaseStore::connect(&config.database_url, config.auto_migrate).await?,
        )),
        #[cfg(not(feature = "database"))]
        StorageBackend::Sqlite => Err(StoreError::Unavailable(
            "the sqlite backend requires the `database` feature".to_string(),
        )),
    }
}

#[derive(Clone)]
pub struct PhaseStateRegistry {
    store: Arc<dyn PhaseStore>,
    cache: Cache<WorkflowId, WorkflowInstance>,
}

impl PhaseStateRegistry {
    pub fn new(store: Arc<dyn PhaseStore>, cache_config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_config.max_capacity)
            .time_to_idle(Duration::from_secs(cache_config.time_to_idle_seconds))
            .build();
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<dyn PhaseStore> {
        &self.store
    }

    /// Register a new workflow at intake, starting in the initial phase
    pub async fn create_workflow(&self, instance: WorkflowInstance) -> Result<WorkflowInstance, StoreError> {
        self.store.insert_instance(&instance).await?;
        self.cache.insert(instance.id.clone(), instance.clone()).await;
        info!(
            workflow_id = %instance.id,
            phase = %instance.current_phase,
            auto_advance = instance.auto_advance,
            human_review_required = instance.human_review_required,
            "Workflow registered"
        );
        Ok(instance)
    }

    /// Read-through load
    pub async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowInstance>, StoreError> {
        if let Some(instance) = self.cache.get(workflow_id).await {
            debug!(workflow_id = %workflow_id, "Instance cache hit");
            return Ok(Some(instance));
        }

        let instance = self.store.load_instance(workflow_id).await?;
        if let Some(ref instance) = instance {
            self.cache.insert(workflow_id.clone(), instance.clone()).await;
        }
        Ok(instance)
    }

    /// Persist an instance. Only the transition executor calls this after intake.
    pub(crate) async fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        match self.store.save_instance(instance).await {
            Ok(()) => {
                self.cache.insert(instance.id.clone(), instance.clone()).await;
                Ok(())
            }
            Err(e) => {
                warn!(
                    workflow_id = %instance.id,
                    error = %e,
                    "Instance save failed, dropping cached copy"
                );
                self.cache.invalidate(&instance.id).await;
                Err(e)
            }
        }
    }

    /// Drop the cached copy after the persisted state was changed out of band
    pub async fn invalidate(&self, workflow_id: &WorkflowId) {
        self.cache.invalidate(workflow_id).await;
        debug!(workflow_id = %workflow_id, "Instance cache entry invalidated");
    }

    pub async fn list(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        self.store.list_instances().await
    }

    pub async fn progress(&self, workflow_id: &WorkflowId) -> Result<PhaseProgress, StoreError> {
        self.store.load_progress(workflow_id).await
    }

    pub async fn record_progress(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        self.store.save_progress(snapshot).await
    }

    pub async fn history(&self, workflow_id: &WorkflowId) -> Result<Vec<TransitionRecord>, StoreError> {
        self.store.transitions(workflow_id).await
    }

    pub(crate) async fn append_record(&self, record: &TransitionRecord) -> Result<(), StoreError> {
        self.store.append_transition(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Phase;

    fn registry_over(store: Arc<dyn PhaseStore>) -> PhaseStateRegistry {
        PhaseStateRegistry::new(store, &CacheConfig::default())
    }

    #[tokio::test]
    async fn test_load_reads_through_to_store() {
        let store = Arc::new(MemoryPhaseStore::new());
        let instance = WorkflowInstance::new(WorkflowId::new("wf-1"));
        store.insert_instance(&instance).await.unwrap();

        let registry = registry_over(store.clone());
        assert_eq!(registry.load(&instance.id).await.unwrap(), Some(instance.clone()));
        assert_eq!(registry.load(&WorkflowId::new("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_exposes_out_of_band_writes() {
        let store = Arc::new(MemoryPhaseStore::new());
        let registry = registry_over(store.clone());
        let instance = registry
            .create_workflow(WorkflowInstance::new(WorkflowId::new("wf-1")))
            .await
            .unwrap();

        // Another process moves the workflow behind the cache's back
        let external = instance.transitioned(Phase::Paused, "operator");
        store.save_instance(&external).await.unwrap();
        assert_eq!(
            registry.load(&instance.id).await.unwrap().unwrap().current_phase,
            Phase::Ideation
        );

        registry.invalidate(&instance.id).await;
        assert_eq!(
            registry.load(&instance.id).await.unwrap().unwrap().current_phase,
            Phase::Paused
        );
    }

    #[tokio::test]
    async fn test_failed_save_invalidates_cache() {
        let instance = WorkflowInstance::new(WorkflowId::new("wf-1"));
        let stored = instance.clone();

        let mut store = MockPhaseStore::new();
        store.expect_insert_instance().returning(|_| Ok(()));
        store
            .expect_save_instance()
            .returning(|_| Err(StoreError::Unavailable("disk full".into())));
        store
            .expect_load_instance()
            .times(1)
            .returning(move |_| Ok(Some(stored.clone())));

        let registry = registry_over(Arc::new(store));
        registry.create_workflow(instance.clone()).await.unwrap();

        let moved = instance.transitioned(Phase::IdeationReady, "ready");
        assert!(registry.save(&moved).await.is_err());

        // The cache no longer claims the unsaved phase; the store is consulted again
        let loaded = registry.load(&instance.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_phase, Phase::Ideation);
    }
}

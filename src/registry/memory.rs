use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::store::{PhaseStore, StoreError};
use crate::handoff::{HandoffBundle, PhaseArtifacts};
use crate::workflow::{Phase, PhaseProgress, ProgressSnapshot, TransitionRecord, WorkflowId, WorkflowInstance};

#[derive(Default)]
struct Storage {
    instances: HashMap<WorkflowId, WorkflowInstance>,
    transitions: HashMap<WorkflowId, Vec<TransitionRecord>>,
    progress: HashMap<WorkflowId, PhaseProgress>,
    artifacts: HashMap<(WorkflowId, Phase), PhaseArtifacts>,
    handoffs: HashMap<WorkflowId, Vec<HandoffBundle>>,
}

/// In-memory store for tests and embedded use. Nothing survives the process.
#[derive(Default)]
pub struct MemoryPhaseStore {
    storage: RwLock<Storage>,
}

impl MemoryPhaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PhaseStore for MemoryPhaseStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let mut storage = self.storage.write().await;
        if storage.instances.contains_key(&instance.id) {
            return Err(StoreError::AlreadyExists(instance.id.clone()));
        }
        storage.instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn load_instance(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self.storage.read().await.instances.get(workflow_id).cloned())
    }

    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        self.storage
            .write()
            .await
            .instances
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let storage = self.storage.read().await;
        let mut instances: Vec<_> = storage.instances.values().cloned().collect();
        instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(instances)
    }

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), StoreError> {
        self.storage
            .write()
            .await
            .transitions
            .entry(record.workflow_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn transitions(&self, workflow_id: &WorkflowId) -> Result<Vec<TransitionRecord>, StoreError> {
        Ok(self
            .storage
            .read()
            .await
            .transitions
            .get(workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_progress(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        self.storage
            .write()
            .await
            .progress
            .entry(snapshot.workflow_id.clone())
            .or_default()
            .record(snapshot.clone());
        Ok(())
    }

    async fn load_progress(&self, workflow_id: &WorkflowId) -> Result<PhaseProgress, StoreError> {
        Ok(self
            .storage
            .read()
            .await
            .progress
            .get(workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        artifacts: &PhaseArtifacts,
    ) -> Result<(), StoreError> {
        self.storage
            .write()
            .await
            .artifacts
            .insert((workflow_id.clone(), phase), artifacts.clone());
        Ok(())
    }

    async fn load_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
    ) -> Result<Option<PhaseArtifacts>, StoreError> {
        Ok(self
            .storage
            .read()
            .await
            .artifacts
            .get(&(workflow_id.clone(), phase))
            .cloned())
    }

    async fn save_handoff(&self, bundle: &HandoffBundle) -> Result<(), StoreError> {
        self.storage
            .write()
            .await
            .handoffs
            .entry(bundle.workflow_id().clone())
            .or_default()
            .push(bundle.clone());
        Ok(())
    }

    async fn handoffs(&self, workflow_id: &WorkflowId) -> Result<Vec<HandoffBundle>, StoreError> {
        Ok(self
            .storage
            .read()
            .await
            .handoffs
            .get(workflow_id)
            .cloned()
            .unwrap_or_default())
    }
}

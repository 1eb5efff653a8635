// JSON file store - one directory tree per state root
//
//   instances/<workflow>.json          current WorkflowInstance
//   transitions/<workflow>.jsonl       append-only TransitionRecord log
//   progress/<workflow>/<phase>.json   latest ProgressSnapshot
//   artifacts/<workflow>/<phase>.json  PhaseArtifacts
//   handoffs/<workflow>.jsonl          every HandoffBundle built
//
// Whole-record writes go through a temp file and a rename so a crash never leaves
// a half-written instance behind. Every rewritten file holds exactly one record,
// so concurrent writers of different records never read-modify-write each other.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use super::store::{PhaseStore, StoreError};
use crate::handoff::{HandoffBundle, PhaseArtifacts};
use crate::workflow::{Phase, PhaseProgress, ProgressSnapshot, TransitionRecord, WorkflowId, WorkflowInstance};

pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workflow ids become file names, so only a conservative character set is accepted
    fn key(workflow_id: &WorkflowId) -> Result<&str, StoreError> {
        let id = workflow_id.as_str();
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(id)
        } else {
            Err(StoreError::InvalidId(id.to_string()))
        }
    }

    fn instance_path(&self, workflow_id: &WorkflowId) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("instances").join(format!("{}.json", Self::key(workflow_id)?)))
    }

    fn transitions_path(&self, workflow_id: &WorkflowId) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("transitions").join(format!("{}.jsonl", Self::key(workflow_id)?)))
    }

    fn progress_dir(&self, workflow_id: &WorkflowId) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("progress").join(Self::key(workflow_id)?))
    }

    fn progress_path(&self, workflow_id: &WorkflowId, phase: Phase) -> Result<PathBuf, StoreError> {
        Ok(self.progress_dir(workflow_id)?.join(format!("{}.json", phase.as_str())))
    }

    fn artifacts_path(&self, workflow_id: &WorkflowId, phase: Phase) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join("artifacts")
            .join(Self::key(workflow_id)?)
            .join(format!("{}.json", phase.as_str())))
    }

    fn handoffs_path(&self, workflow_id: &WorkflowId) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("handoffs").join(format!("{}.jsonl", Self::key(workflow_id)?)))
    }

    async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(value)?;

        // Unique temp name so concurrent writers of one record never share a temp file
        let temp_file = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&temp_file, serialized).await?;
        fs::rename(&temp_file, path).await?;
        Ok(())
    }

    async fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(value)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| StoreError::Corrupted {
                    reason: format!("{} line {}: {}", path.display(), index + 1, e),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PhaseStore for JsonFileStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let path = self.instance_path(&instance.id)?;
        if fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(instance.id.clone()));
        }
        Self::write_atomic(&path, instance).await?;
        info!(
            workflow_id = %instance.id,
            file = ?path,
            "Workflow instance created"
        );
        Ok(())
    }

    async fn load_instance(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowInstance>, StoreError> {
        let instance: Option<WorkflowInstance> = Self::read_optional(&self.instance_path(workflow_id)?).await?;
        match instance {
            Some(instance) if instance.id != *workflow_id => Err(StoreError::Corrupted {
                reason: format!(
                    "instance file for {} contains workflow {}",
                    workflow_id, instance.id
                ),
            }),
            other => Ok(other),
        }
    }

    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let path = self.instance_path(&instance.id)?;
        Self::write_atomic(&path, instance).await?;
        debug!(
            workflow_id = %instance.id,
            phase = %instance.current_phase,
            revision = instance.revision,
            "Workflow instance saved"
        );
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let dir = self.root.join("instances");
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut instances = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(instance) = Self::read_optional::<WorkflowInstance>(&path).await? {
                instances.push(instance);
            }
        }
        instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(instances)
    }

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), StoreError> {
        Self::append_line(&self.transitions_path(&record.workflow_id)?, record).await
    }

    async fn transitions(&self, workflow_id: &WorkflowId) -> Result<Vec<TransitionRecord>, StoreError> {
        Self::read_lines(&self.transitions_path(workflow_id)?).await
    }

    async fn save_progress(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        let path = self.progress_path(&snapshot.workflow_id, snapshot.phase)?;
        Self::write_atomic(&path, snapshot).await
    }

    async fn load_progress(&self, workflow_id: &WorkflowId) -> Result<PhaseProgress, StoreError> {
        let dir = self.progress_dir(workflow_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PhaseProgress::new()),
            Err(e) => return Err(e.into()),
        };

        let mut progress = PhaseProgress::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Skips in-flight temp files as well as strays
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(snapshot) = Self::read_optional::<ProgressSnapshot>(&path).await? else {
                continue;
            };
            if snapshot.workflow_id != *workflow_id {
                return Err(StoreError::Corrupted {
                    reason: format!("{} contains progress of workflow {}", path.display(), snapshot.workflow_id),
                });
            }
            progress.record(snapshot);
        }
        Ok(progress)
    }

    async fn save_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        artifacts: &PhaseArtifacts,
    ) -> Result<(), StoreError> {
        Self::write_atomic(&self.artifacts_path(workflow_id, phase)?, artifacts).await
    }

    async fn load_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
    ) -> Result<Option<PhaseArtifacts>, StoreError> {
        Self::read_optional(&self.artifacts_path(workflow_id, phase)?).await
    }

    async fn save_handoff(&self, bundle: &HandoffBundle) -> Result<(), StoreError> {
        Self::append_line(&self.handoffs_path(bundle.workflow_id())?, bundle).await
    }

    async fn handoffs(&self, workflow_id: &WorkflowId) -> Result<Vec<HandoffBundle>, StoreError> {
        Self::read_lines(&self.handoffs_path(workflow_id)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::{build_handoff, Artifact};
    use crate::workflow::{TransitionOutcome, TriggeringActor};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_instance_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        let instance = WorkflowInstance::new(WorkflowId::new("wf-1")).with_auto_advance(true);

        store.insert_instance(&instance).await.unwrap();
        let loaded = store.load_instance(&instance.id).await.unwrap().unwrap();
        assert_eq!(loaded, instance);

        let moved = instance.transitioned(Phase::IdeationReady, "ready");
        store.save_instance(&moved).await.unwrap();
        let loaded = store.load_instance(&instance.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_phase, Phase::IdeationReady);
        assert_eq!(loaded.revision, 1);

        assert!(store.load_instance(&WorkflowId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_and_bad_ids_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        let instance = WorkflowInstance::new(WorkflowId::new("wf-1"));
        store.insert_instance(&instance).await.unwrap();

        assert!(matches!(
            store.insert_instance(&instance).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.load_instance(&WorkflowId::new("../escape")).await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_log_is_append_only_and_ordered() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        let id = WorkflowId::new("wf-1");

        for (from, to, outcome) in [
            (Phase::Ideation, Phase::SpecReady, TransitionOutcome::Rejected),
            (Phase::Ideation, Phase::IdeationReady, TransitionOutcome::Committed),
        ] {
            let record = TransitionRecord::new(id.clone(), from, to, "test", outcome, TriggeringActor::Human, false);
            store.append_transition(&record).await.unwrap();
        }

        let records = store.transitions(&id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, TransitionOutcome::Rejected);
        assert!(records[1].is_committed());
        assert!(store.transitions(&WorkflowId::new("none")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_log_line_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        let id = WorkflowId::new("wf-1");
        let path = store.transitions_path(&id).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json}\n").unwrap();

        let err = store.transitions(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { reason } if reason.contains("line 1")));
    }

    #[tokio::test]
    async fn test_progress_artifacts_and_handoffs_persist() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        let id = WorkflowId::new("wf-1");

        store
            .save_progress(&ProgressSnapshot::new(id.clone(), Phase::Ideation).with_completion(0.6))
            .await
            .unwrap();
        store
            .save_progress(&ProgressSnapshot::new(id.clone(), Phase::Specification).with_tasks(3, 0))
            .await
            .unwrap();
        let progress = store.load_progress(&id).await.unwrap();
        assert_eq!(progress.get(Phase::Ideation).unwrap().completion_score, 0.6);
        assert_eq!(progress.get(Phase::Specification).unwrap().generated_tasks, 3);

        let artifacts = PhaseArtifacts::new().with_artifact(Artifact::ProblemStatement {
            text: "Walkers double-book".into(),
        });
        store.save_artifacts(&id, Phase::Ideation, &artifacts).await.unwrap();
        assert_eq!(
            store.load_artifacts(&id, Phase::Ideation).await.unwrap(),
            Some(artifacts.clone())
        );
        assert!(store.load_artifacts(&id, Phase::Building).await.unwrap().is_none());

        let bundle = build_handoff(Phase::Ideation, &id, &artifacts).unwrap();
        store.save_handoff(&bundle).await.unwrap();
        assert_eq!(store.handoffs(&id).await.unwrap(), vec![bundle]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_progress_saves_for_different_phases_are_all_kept() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(temp_dir.path()));

        for round in 0..20 {
            let id = WorkflowId::new(format!("wf-{}", round));
            let tasks: Vec<_> = [Phase::Ideation, Phase::Specification, Phase::Building]
                .into_iter()
                .map(|phase| {
                    let store = store.clone();
                    let snapshot = ProgressSnapshot::new(id.clone(), phase).with_completion(0.5);
                    tokio::spawn(async move { store.save_progress(&snapshot).await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            let progress = store.load_progress(&id).await.unwrap();
            assert!(progress.is_started(Phase::Ideation), "round {} lost ideation", round);
            assert!(progress.is_started(Phase::Specification), "round {} lost specification", round);
            assert!(progress.is_started(Phase::Building), "round {} lost building", round);
        }
    }

    #[tokio::test]
    async fn test_progress_is_one_file_per_phase() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        let id = WorkflowId::new("wf-1");
        assert!(store.load_progress(&id).await.unwrap().is_empty());

        store
            .save_progress(&ProgressSnapshot::new(id.clone(), Phase::Ideation).with_completion(0.2))
            .await
            .unwrap();
        store
            .save_progress(&ProgressSnapshot::new(id.clone(), Phase::Ideation).with_completion(0.7))
            .await
            .unwrap();

        assert!(temp_dir.path().join("progress/wf-1/ideation.json").exists());
        let progress = store.load_progress(&id).await.unwrap();
        assert_eq!(progress.snapshots().count(), 1);
        assert_eq!(progress.get(Phase::Ideation).unwrap().completion_score, 0.7);
    }

    #[tokio::test]
    async fn test_list_instances_in_creation_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        assert!(store.list_instances().await.unwrap().is_empty());

        let first = WorkflowInstance::new(WorkflowId::new("b-first"));
        let mut second = WorkflowInstance::new(WorkflowId::new("a-second"));
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.insert_instance(&first).await.unwrap();
        store.insert_instance(&second).await.unwrap();

        let listed: Vec<_> = store
            .list_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|instance| instance.id)
            .collect();
        assert_eq!(listed, vec![first.id, second.id]);
    }
}

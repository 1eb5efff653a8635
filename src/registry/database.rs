use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::info;

use super::store::{PhaseStore, StoreError};
use crate::handoff::{HandoffBundle, PhaseArtifacts};
use crate::workflow::{Phase, PhaseProgress, ProgressSnapshot, TransitionRecord, WorkflowId, WorkflowInstance};

/// SQLite-backed phase store
pub struct SqlitePhaseStore {
    pool: SqlitePool,
}

impl SqlitePhaseStore {
    /// Open (creating if needed) the database, running migrations when asked
    pub async fn connect(database_url: &str, auto_migrate: bool) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePool::connect(database_url).await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StoreError::Unavailable(format!("migration failed: {}", e)))?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

fn decode<T: DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T, StoreError> {
    let data: String = row.try_get("data")?;
    Ok(serde_json::from_str(&data)?)
}

#[async_trait]
impl PhaseStore for SqlitePhaseStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO workflow_instances (workflow_id, current_phase, revision, created_at, data, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            "#,
        )
        .bind(instance.id.as_str())
        .bind(instance.current_phase.as_str())
        .bind(instance.revision as i64)
        .bind(instance.created_at.to_rfc3339())
        .bind(serde_json::to_string(instance)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::AlreadyExists(instance.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_instance(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowInstance>, StoreError> {
        let row = sqlx::query("SELECT data FROM workflow_instances WHERE workflow_id = ?1")
            .bind(workflow_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO workflow_instances (workflow_id, current_phase, revision, created_at, data, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            "#,
        )
        .bind(instance.id.as_str())
        .bind(instance.current_phase.as_str())
        .bind(instance.revision as i64)
        .bind(instance.created_at.to_rfc3339())
        .bind(serde_json::to_string(instance)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let rows = sqlx::query("SELECT data FROM workflow_instances ORDER BY created_at ASC, workflow_id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transition_records (record_id, workflow_id, from_phase, to_phase, outcome, data, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.workflow_id.as_str())
        .bind(record.from_phase.as_str())
        .bind(record.to_phase.as_str())
        .bind(record.outcome.as_str())
        .bind(serde_json::to_string(record)?)
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn transitions(&self, workflow_id: &WorkflowId) -> Result<Vec<TransitionRecord>, StoreError> {
        let rows = sqlx::query("SELECT data FROM transition_records WHERE workflow_id = ?1 ORDER BY seq ASC")
            .bind(workflow_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn save_progress(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO progress_snapshots (workflow_id, phase, data, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(snapshot.workflow_id.as_str())
        .bind(snapshot.phase.as_str())
        .bind(serde_json::to_string(snapshot)?)
        .bind(snapshot.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_progress(&self, workflow_id: &WorkflowId) -> Result<PhaseProgress, StoreError> {
        let rows = sqlx::query("SELECT data FROM progress_snapshots WHERE workflow_id = ?1")
            .bind(workflow_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(decode::<ProgressSnapshot>)
            .collect::<Result<PhaseProgress, _>>()
    }

    async fn save_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        artifacts: &PhaseArtifacts,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO phase_artifacts (workflow_id, phase, data, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            "#,
        )
        .bind(workflow_id.as_str())
        .bind(phase.as_str())
        .bind(serde_json::to_string(artifacts)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
    ) -> Result<Option<PhaseArtifacts>, StoreError> {
        let row = sqlx::query("SELECT data FROM phase_artifacts WHERE workflow_id = ?1 AND phase = ?2")
            .bind(workflow_id.as_str())
            .bind(phase.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn save_handoff(&self, bundle: &HandoffBundle) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO handoff_bundles (bundle_id, workflow_id, source_phase, target_phase, data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(bundle.id().to_string())
        .bind(bundle.workflow_id().as_str())
        .bind(bundle.source_phase().as_str())
        .bind(bundle.target_phase().as_str())
        .bind(serde_json::to_string(bundle)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn handoffs(&self, workflow_id: &WorkflowId) -> Result<Vec<HandoffBundle>, StoreError> {
        let rows = sqlx::query("SELECT data FROM handoff_bundles WHERE workflow_id = ?1 ORDER BY seq ASC")
            .bind(workflow_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }
}

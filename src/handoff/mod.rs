//! Handoff builders: read-side aggregation of what a phase worker accumulated into
//! an immutable bundle that initializes the next phase's worker.

pub mod artifacts;
pub mod extract;

pub use artifacts::{
    Artifact, ClarifyingQuestion, ConversationTurn, PhaseArtifacts, PlanStep, Speaker, TaskStatus,
    WorkUnit,
};
pub use extract::{FieldSource, Resolved};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::registry::{PhaseStore, StoreError};
use crate::workflow::{Phase, WorkflowId};

/// Bumped whenever the serialized bundle layout changes
pub const HANDOFF_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Phase {0} does not hand off to another worker")]
    NoDownstreamPhase(Phase),

    #[error("Failed to read artifacts: {0}")]
    Store(#[from] StoreError),
}

/// Where each bundle field came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffProvenance {
    pub problem_statement: FieldSource,
    pub requirements: FieldSource,
    pub execution_plan: FieldSource,
    pub entities: FieldSource,
    pub target_audience: FieldSource,
    pub success_metrics: FieldSource,
}

/// Immutable, versioned knowledge snapshot passed from phase N to phase N+1.
///
/// Built once by [`build_handoff`]; there are no setters and nothing inside refers
/// back to the artifacts it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffBundle {
    id: Uuid,
    schema_version: u32,
    workflow_id: WorkflowId,
    source_phase: Phase,
    target_phase: Phase,
    created_at: DateTime<Utc>,
    problem_statement: Option<String>,
    requirements: Vec<String>,
    execution_plan: Vec<PlanStep>,
    entities: Vec<String>,
    target_audience: Option<String>,
    success_metrics: Vec<String>,
    provenance: HandoffProvenance,
}

impl HandoffBundle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn source_phase(&self) -> Phase {
        self.source_phase
    }

    pub fn target_phase(&self) -> Phase {
        self.target_phase
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn problem_statement(&self) -> Option<&str> {
        self.problem_statement.as_deref()
    }

    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    pub fn execution_plan(&self) -> &[PlanStep] {
        &self.execution_plan
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn target_audience(&self) -> Option<&str> {
        self.target_audience.as_deref()
    }

    pub fn success_metrics(&self) -> &[String] {
        &self.success_metrics
    }

    pub fn provenance(&self) -> &HandoffProvenance {
        &self.provenance
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// The worker phase a source phase hands its knowledge to
pub fn handoff_target(source: Phase) -> Option<Phase> {
    Phase::ALL
        .into_iter()
        .find(|phase| phase.handoff_source() == Some(source))
}

/// Pure aggregation of `artifacts` (accumulated in `source`) into a bundle.
///
/// Ideation feeds problem, requirements, entities, audience and success metrics.
/// Specification and building feed problem, requirements, plan and entities.
pub fn build_handoff(
    source: Phase,
    workflow_id: &WorkflowId,
    artifacts: &PhaseArtifacts,
) -> Result<HandoffBundle, HandoffError> {
    let target = handoff_target(source).ok_or(HandoffError::NoDownstreamPhase(source))?;
    let from_ideation = source == Phase::Ideation;

    let problem = extract::resolve_problem(artifacts);
    let requirements = extract::resolve_requirements(artifacts);
    let entities = extract::resolve_entities(artifacts);
    let plan = if from_ideation {
        skipped(Vec::new())
    } else {
        extract::resolve_execution_plan(artifacts)
    };
    let (audience, metrics) = if from_ideation {
        (
            extract::resolve_target_audience(artifacts),
            extract::resolve_success_metrics(artifacts),
        )
    } else {
        (skipped(None), skipped(Vec::new()))
    };

    Ok(HandoffBundle {
        id: Uuid::new_v4(),
        schema_version: HANDOFF_SCHEMA_VERSION,
        workflow_id: workflow_id.clone(),
        source_phase: source,
        target_phase: target,
        created_at: Utc::now(),
        provenance: HandoffProvenance {
            problem_statement: problem.source,
            requirements: requirements.source,
            execution_plan: plan.source,
            entities: entities.source,
            target_audience: audience.source,
            success_metrics: metrics.source,
        },
        problem_statement: problem.value,
        requirements: requirements.value,
        execution_plan: plan.value,
        entities: entities.value,
        target_audience: audience.value,
        success_metrics: metrics.value,
    })
}

fn skipped<T>(value: T) -> Resolved<T> {
    Resolved {
        value,
        source: FieldSource::Absent,
    }
}

/// Loads a source phase's artifacts from the store and builds its bundle
#[derive(Clone)]
pub struct HandoffBuilder {
    store: Arc<dyn PhaseStore>,
}

impl HandoffBuilder {
    pub fn new(store: Arc<dyn PhaseStore>) -> Self {
        Self { store }
    }

    /// Read-only: a phase with no stored artifacts yields a bundle of absent fields.
    pub async fn build_handoff(
        &self,
        source: Phase,
        workflow_id: &WorkflowId,
    ) -> Result<HandoffBundle, HandoffError> {
        let artifacts = self
            .store
            .load_artifacts(workflow_id, source)
            .await?
            .unwrap_or_default();
        let bundle = build_handoff(source, workflow_id, &artifacts)?;
        debug!(
            workflow_id = %workflow_id,
            source = %source,
            target = %bundle.target_phase(),
            bundle_id = %bundle.id(),
            "Built handoff bundle"
        );
        Ok(bundle)
    }
}

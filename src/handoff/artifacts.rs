// Phase artifacts - what a phase worker has accumulated and exposes to the orchestrator
//
// Workers write these into the store; handoff builders and completion detectors read
// them. The orchestrator never judges their content, it only aggregates and counts.

use serde::{Deserialize, Serialize};

/// A typed artifact produced by a phase worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    ProblemStatement { text: String },
    TargetAudience { description: String },
    Requirements { items: Vec<String> },
    SuccessMetrics { items: Vec<String> },
    Entities { names: Vec<String> },
    ExecutionPlan { steps: Vec<PlanStep> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl PlanStep {
    pub fn new(order: u32, title: impl Into<String>) -> Self {
        Self {
            order,
            title: title.into(),
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub text: String,
    #[serde(default)]
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// A generated unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub title: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseArtifacts {
    #[serde(default)]
    pub structured: Vec<Artifact>,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
    #[serde(default)]
    pub questions: Vec<ClarifyingQuestion>,
    #[serde(default)]
    pub work_units: Vec<WorkUnit>,
    /// Times a human had to step in during the phase
    #[serde(default)]
    pub interventions: u32,
}

impl PhaseArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.structured.push(artifact);
        self
    }

    pub fn with_turn(mut self, turn: ConversationTurn) -> Self {
        self.conversation.push(turn);
        self
    }

    pub fn with_question(mut self, text: impl Into<String>, resolved: bool) -> Self {
        self.questions.push(ClarifyingQuestion {
            text: text.into(),
            resolved,
        });
        self
    }

    pub fn with_work_unit(mut self, title: impl Into<String>, status: TaskStatus) -> Self {
        self.work_units.push(WorkUnit {
            title: title.into(),
            status,
        });
        self
    }

    pub fn open_questions(&self) -> usize {
        self.questions.iter().filter(|q| !q.resolved).count()
    }

    pub fn generated_tasks(&self) -> usize {
        self.work_units.len()
    }

    pub fn failed_tasks(&self) -> usize {
        self.count_tasks(TaskStatus::Failed)
    }

    /// Work units that finished, successfully or not
    pub fn executed_tasks(&self) -> usize {
        self.count_tasks(TaskStatus::Done) + self.count_tasks(TaskStatus::Failed)
    }

    fn count_tasks(&self, status: TaskStatus) -> usize {
        self.work_units.iter().filter(|unit| unit.status == status).count()
    }
}

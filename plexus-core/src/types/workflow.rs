//! Workflow state and phase specifications.

use crate::id::{AgentId, SessionId, WorkItemId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of a workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Active,
    /// Paused awaiting external input; a data-level state, no task blocks
    Suspended,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Whether `self -> to` is a legal lifecycle edge.
    ///
    /// Suspension is reachable from any live state; a suspended workflow
    /// must resume (or fail) before making further progress.
    pub fn can_transition_to(self, to: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, to),
            (Pending, Active)
                | (Pending, Suspended)
                | (Pending, Failed)
                | (Active, Suspended)
                | (Active, Completed)
                | (Active, Failed)
                | (Suspended, Active)
                | (Suspended, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Persistent state of a coordinated workflow.
///
/// `progress` is monotonically non-decreasing while the workflow is live;
/// backward updates are rejected at the engine boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    pub session_id: SessionId,
    pub name: String,
    pub current_phase: String,
    pub status: WorkflowStatus,
    /// Completion percentage, 0..=100
    pub progress: u8,
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded phase change of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseTransition {
    pub workflow_id: WorkflowId,
    pub from_phase: Option<String>,
    pub to_phase: String,
    pub at: DateTime<Utc>,
}

/// One phase of a workflow specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Unique name within the workflow
    pub name: String,
    /// Agent the phase's work item is pre-assigned to
    pub agent: AgentId,
    pub task_type: String,
    pub payload: Value,
    /// Names of phases that must complete first
    pub depends_on: Vec<String>,
}

impl PhaseSpec {
    pub fn new(
        name: impl Into<String>,
        agent: AgentId,
        task_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            name: name.into(),
            agent,
            task_type: task_type.into(),
            payload,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, phase: impl Into<String>) -> Self {
        self.depends_on.push(phase.into());
        self
    }
}

/// Creation parameters for a coordinated workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    pub session_id: SessionId,
    pub phases: Vec<PhaseSpec>,
    pub context: Value,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            name: name.into(),
            session_id,
            phases: Vec::new(),
            context: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn phase(mut self, phase: PhaseSpec) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Result of workflow creation: the state row plus one work item per phase,
/// in phase order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedWorkflow {
    pub workflow_id: WorkflowId,
    pub work_item_ids: Vec<WorkItemId>,
}

//! Work items and their lifecycle.

use crate::id::{AgentId, SessionId, WorkItemId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of a work item.
///
/// Legal transitions:
///
/// ```text
/// pending -> assigned -> in_progress -> completed
///    ^           |            |
///    |           v            v
///    +------- (release)     failed -> pending (retry)
///                             |
///                             v
///                        dead_lettered
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    DeadLettered,
}

impl WorkItemStatus {
    /// Whether `self -> to` is a legal lifecycle edge
    pub fn can_transition_to(self, to: WorkItemStatus) -> bool {
        use WorkItemStatus::*;
        matches!(
            (self, to),
            (Pending, Assigned)
                | (Assigned, InProgress)
                | (Assigned, Pending)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, Pending)
                | (Failed, DeadLettered)
        )
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::DeadLettered)
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Assigned => write!(f, "assigned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// A unit of work flowing through the queue.
///
/// Work items are never physically deleted: exhausted items are flagged
/// `dead_lettered` and keep their row for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub session_id: SessionId,
    pub workflow_id: Option<WorkflowId>,
    /// Phase name when this item was created by a workflow
    pub phase: Option<String>,
    pub task_type: String,
    /// Lower value = more urgent; ties break by earliest deadline
    pub priority: i32,
    /// Opaque task input; the expected shape per `task_type` is a contract
    /// between producer and the consuming executor
    pub payload: Value,
    pub status: WorkItemStatus,
    pub assigned_agent: Option<AgentId>,
    pub retries: u32,
    pub can_retry: bool,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub dead_lettered: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Materialize a work item from its creation parameters.
    ///
    /// Every item starts `Pending`. A pre-assigned agent (delegations,
    /// workflow phases) is recorded as a reservation in `assigned_agent`;
    /// the reserved agent still moves the item to `Assigned` through the
    /// normal atomic claim.
    pub fn new(spec: NewWorkItem) -> Self {
        let now = Utc::now();
        Self {
            id: WorkItemId::new(),
            session_id: spec.session_id,
            workflow_id: spec.workflow_id,
            phase: spec.phase,
            task_type: spec.task_type,
            priority: spec.priority,
            payload: spec.payload,
            status: WorkItemStatus::Pending,
            assigned_agent: spec.assigned_agent,
            retries: 0,
            can_retry: spec.can_retry,
            next_retry_at: None,
            dead_lettered: false,
            result: None,
            error: None,
            deadline: spec.deadline,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether this failed item is due for another attempt at `now`
    pub fn retry_due(&self, now: DateTime<Utc>) -> bool {
        self.status == WorkItemStatus::Failed
            && self.can_retry
            && !self.dead_lettered
            && self.next_retry_at.is_none_or(|at| at <= now)
    }
}

/// Creation parameters for a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub session_id: SessionId,
    pub task_type: String,
    pub payload: Value,
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub workflow_id: Option<WorkflowId>,
    pub phase: Option<String>,
    pub assigned_agent: Option<AgentId>,
    pub can_retry: bool,
}

impl NewWorkItem {
    pub fn new(session_id: SessionId, task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            session_id,
            task_type: task_type.into(),
            payload,
            priority: 0,
            deadline: None,
            workflow_id: None,
            phase: None,
            assigned_agent: None,
            can_retry: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_assignee(mut self, agent: AgentId) -> Self {
        self.assigned_agent = Some(agent);
        self
    }

    pub fn with_workflow(mut self, workflow_id: WorkflowId, phase: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id);
        self.phase = Some(phase.into());
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.can_retry = false;
        self
    }
}

/// Point-in-time status summary for a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub work_item_id: WorkItemId,
    pub status: WorkItemStatus,
    pub assigned_agent: Option<AgentId>,
    pub retries: u32,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkItem> for TaskStatusReport {
    fn from(item: &WorkItem) -> Self {
        Self {
            work_item_id: item.id,
            status: item.status,
            assigned_agent: item.assigned_agent.clone(),
            retries: item.retries,
            error: item.error.clone(),
            updated_at: item.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legal_transitions() {
        use WorkItemStatus::*;
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InProgress));
        assert!(Assigned.can_transition_to(Pending));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Failed.can_transition_to(DeadLettered));
    }

    #[test]
    fn test_illegal_transitions() {
        use WorkItemStatus::*;
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!DeadLettered.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(Assigned));
        assert!(!Failed.can_transition_to(InProgress));
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkItemStatus::Completed.is_terminal());
        assert!(WorkItemStatus::DeadLettered.is_terminal());
        assert!(!WorkItemStatus::Failed.is_terminal());
        assert!(!WorkItemStatus::Pending.is_terminal());
    }

    #[test]
    fn test_new_item_starts_pending() {
        let item = WorkItem::new(NewWorkItem::new(
            SessionId::new(),
            "rfp_scan",
            json!({"document": "rfp-2024-001"}),
        ));
        assert_eq!(item.status, WorkItemStatus::Pending);
        assert_eq!(item.retries, 0);
        assert!(item.can_retry);
        assert!(!item.dead_lettered);
        assert!(item.assigned_agent.is_none());
    }

    #[test]
    fn test_reserved_item_still_starts_pending() {
        let spec = NewWorkItem::new(SessionId::new(), "compliance_check", json!({}))
            .with_assignee(AgentId::new("manager-1"));
        let item = WorkItem::new(spec);
        // Reservation is recorded but the claim still happens later
        assert_eq!(item.status, WorkItemStatus::Pending);
        assert_eq!(item.assigned_agent, Some(AgentId::new("manager-1")));
    }

    #[test]
    fn test_retry_due() {
        let mut item = WorkItem::new(NewWorkItem::new(SessionId::new(), "scan", json!({})));
        let now = Utc::now();

        // Not failed yet
        assert!(!item.retry_due(now));

        item.status = WorkItemStatus::Failed;
        // No schedule recorded: due immediately
        assert!(item.retry_due(now));

        item.next_retry_at = Some(now + chrono::Duration::seconds(30));
        assert!(!item.retry_due(now));
        assert!(item.retry_due(now + chrono::Duration::seconds(31)));

        item.can_retry = false;
        assert!(!item.retry_due(now + chrono::Duration::seconds(31)));
    }
}

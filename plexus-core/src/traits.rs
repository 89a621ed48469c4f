//! Core traits defining the seams of the Plexus system.
//!
//! The engine consumes persistence through [`Storage`], task execution
//! through [`TaskExecutor`], and user notification through
//! [`NotificationSink`]. All three are object-safe so deployments can swap
//! implementations without touching engine code.

use crate::error::{Result, TaskError};
use crate::id::{AgentId, DeadLetterId, EntryId, SessionId, WorkItemId, WorkflowId};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

/// Trait for coordination state backends.
///
/// Each call is assumed transactional in isolation; cross-call atomicity is
/// provided only where a method says so ([`Storage::claim_work_item`]).
/// Single-entity lookups return `Ok(None)` for missing rows — absence is
/// not an error at this layer.
#[async_trait]
pub trait Storage: Send + Sync {
    // ========================================================================
    // Agents
    // ========================================================================

    /// Insert or replace an agent (upsert keyed by `agent_id`)
    async fn put_agent(&self, agent: &Agent) -> Result<()>;

    /// Get an agent by ID
    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>>;

    /// Remove an agent; returns whether it existed
    async fn delete_agent(&self, id: &AgentId) -> Result<bool>;

    /// List all registered agents
    async fn list_agents(&self) -> Result<Vec<Agent>>;

    /// List agents in a tier
    async fn agents_by_tier(&self, tier: AgentTier) -> Result<Vec<Agent>>;

    /// List agents whose capability set overlaps `capabilities`
    async fn agents_by_capability(&self, capabilities: &[String]) -> Result<Vec<Agent>>;

    /// List agents with the given status
    async fn agents_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>>;

    /// Count work items currently assigned to or in progress for an agent
    async fn count_active_for_agent(&self, agent: &AgentId) -> Result<usize>;

    // ========================================================================
    // Work items
    // ========================================================================

    /// Insert or replace a work item
    async fn put_work_item(&self, item: &WorkItem) -> Result<()>;

    /// Get a work item by ID
    async fn get_work_item(&self, id: WorkItemId) -> Result<Option<WorkItem>>;

    /// Atomically claim a pending work item for an agent.
    ///
    /// Succeeds only while the item is `Pending` and either unreserved or
    /// reserved for `agent`; concurrent claimers race and exactly one wins.
    /// Losers observe [`PlexusError::Conflict`](crate::PlexusError::Conflict).
    async fn claim_work_item(&self, id: WorkItemId, agent: &AgentId) -> Result<WorkItem>;

    /// Pending items, priority ascending then deadline ascending (missing
    /// deadlines last), optionally filtered by reserved agent and task types
    async fn pending_work_items(
        &self,
        reserved_for: Option<&AgentId>,
        task_types: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<WorkItem>>;

    /// All work items with the given status
    async fn work_items_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>>;

    /// Failed items eligible for another attempt at `now`
    async fn work_items_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<WorkItem>>;

    /// All work items belonging to a session
    async fn work_items_by_session(&self, session_id: SessionId) -> Result<Vec<WorkItem>>;

    // ========================================================================
    // Coordination log
    // ========================================================================

    /// Append a new coordination entry, preserving per-session order
    async fn append_coordination_entry(&self, entry: &CoordinationEntry) -> Result<()>;

    /// Get a coordination entry by ID
    async fn get_coordination_entry(&self, id: EntryId) -> Result<Option<CoordinationEntry>>;

    /// Replace an existing coordination entry
    async fn update_coordination_entry(&self, entry: &CoordinationEntry) -> Result<()>;

    /// Session entries in insertion order
    async fn coordination_entries_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<CoordinationEntry>>;

    /// Entries targeting an agent, newest first
    async fn coordination_entries_for_target(
        &self,
        target: &AgentId,
        limit: Option<usize>,
    ) -> Result<Vec<CoordinationEntry>>;

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Insert or replace a session
    async fn put_session(&self, session: &Session) -> Result<()>;

    /// Get a session by ID
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>>;

    // ========================================================================
    // Workflows
    // ========================================================================

    /// Insert or replace a workflow state row
    async fn put_workflow(&self, workflow: &WorkflowState) -> Result<()>;

    /// Get a workflow state row by ID
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<WorkflowState>>;

    /// Append a phase transition event
    async fn append_phase_transition(&self, transition: &PhaseTransition) -> Result<()>;

    /// Phase transitions for a workflow, in recorded order
    async fn phase_transitions(&self, workflow_id: WorkflowId) -> Result<Vec<PhaseTransition>>;

    // ========================================================================
    // Dead letters
    // ========================================================================

    /// Insert or replace a dead letter entry
    async fn put_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()>;

    /// Get a dead letter entry by ID
    async fn get_dead_letter(&self, id: DeadLetterId) -> Result<Option<DeadLetterEntry>>;

    /// Dead letter entries matching a filter, newest first
    async fn dead_letters(&self, filter: DeadLetterFilter) -> Result<Vec<DeadLetterEntry>>;
}

/// Trait for the opaque task execution seam.
///
/// In the producing system this wraps a hosted LLM call; the engine assumes
/// nothing beyond "async function that can fail" plus the
/// [`TaskErrorKind`](crate::TaskErrorKind) classification on failures.
/// Implementations deserialize `payload` into their own typed inputs and
/// should fail with a fatal kind on malformed payloads.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute one task and produce its result document
    async fn execute(
        &self,
        task_type: &str,
        payload: &Value,
    ) -> std::result::Result<Value, TaskError>;
}

/// Trait for best-effort user notification.
///
/// Callers treat delivery as fire-and-forget: failures are logged and
/// aggregated, and one failing notification never blocks siblings or the
/// operation that triggered it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Default [`NotificationSink`] that writes notifications to the tracing
/// subscriber instead of an external channel.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let session = notification
            .session_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        match notification.severity {
            NotificationSeverity::Info => {
                info!(session = %session, "{}", notification.message)
            }
            NotificationSeverity::Warning => {
                warn!(session = %session, "{}", notification.message)
            }
            NotificationSeverity::Critical => {
                error!(session = %session, "{}", notification.message)
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_notifier_never_fails() {
        let sink = TracingNotifier;
        let note = Notification::critical("work item buried").for_session(SessionId::new());
        assert!(sink.notify(&note).await.is_ok());
    }
}

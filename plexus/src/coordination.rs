//! Inter-agent coordination: delegation, specialist requests, messaging,
//! and the per-session audit log.
//!
//! Delegation and specialist requests pair a reserved work item with a
//! log entry; plain messages are audit-only. Entries close at most once
//! and are immutable afterwards.

use crate::queue::WorkQueue;
use chrono::Utc;
use plexus_core::error::PlexusError;
use plexus_core::id::{AgentId, EntryId, SessionId, WorkItemId};
use plexus_core::traits::Storage;
use plexus_core::types::{
    Agent, AgentTier, CoordinationEntry, CoordinationKind, CoordinationStatus, NewWorkItem,
    TaskStatusReport,
};
use plexus_core::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a delegation or specialist request.
#[derive(Debug, Clone, Serialize)]
pub struct Delegation {
    pub work_item_id: WorkItemId,
    pub assigned_agent: AgentId,
    pub entry_id: EntryId,
}

pub struct CoordinationLog {
    storage: Arc<dyn Storage>,
    queue: Arc<WorkQueue>,
}

impl CoordinationLog {
    pub fn new(storage: Arc<dyn Storage>, queue: Arc<WorkQueue>) -> Self {
        Self { storage, queue }
    }

    /// Delegate a task to a manager-tier agent.
    ///
    /// Creates a Pending work item reserved for the manager plus a
    /// `Delegation` log entry. The manager still claims the item through
    /// the normal atomic claim.
    pub async fn delegate_to_manager(
        &self,
        session_id: SessionId,
        initiator: &AgentId,
        manager: &AgentId,
        task_type: impl Into<String>,
        payload: Value,
        priority: i32,
    ) -> Result<Delegation> {
        let task_type = task_type.into();
        self.require_tier(manager, AgentTier::Manager).await?;
        self.record_assignment(
            session_id,
            initiator,
            manager,
            CoordinationKind::Delegation,
            task_type,
            payload,
            priority,
        )
        .await
    }

    /// Request help from a specialist-tier agent.
    pub async fn request_specialist(
        &self,
        session_id: SessionId,
        initiator: &AgentId,
        specialist: &AgentId,
        task_type: impl Into<String>,
        payload: Value,
    ) -> Result<Delegation> {
        let task_type = task_type.into();
        self.require_tier(specialist, AgentTier::Specialist).await?;
        self.record_assignment(
            session_id,
            initiator,
            specialist,
            CoordinationKind::SpecialistRequest,
            task_type,
            payload,
            0,
        )
        .await
    }

    /// Write an audit-only message entry; no work item is created
    pub async fn send_message(
        &self,
        session_id: SessionId,
        initiator: &AgentId,
        target: &AgentId,
        message_type: impl Into<String>,
        content: Value,
    ) -> Result<CoordinationEntry> {
        self.require_agent(target).await?;

        let entry = CoordinationEntry::new(
            session_id,
            initiator.clone(),
            target.clone(),
            CoordinationKind::Message,
            message_type,
        )
        .with_request(content);
        self.storage.append_coordination_entry(&entry).await?;
        debug!(
            "Message '{}' from '{}' to '{}'",
            entry.context, initiator, target
        );
        Ok(entry)
    }

    /// Entries targeting an agent, newest first
    pub async fn messages_for(
        &self,
        agent: &AgentId,
        limit: Option<usize>,
    ) -> Result<Vec<CoordinationEntry>> {
        self.storage
            .coordination_entries_for_target(agent, limit)
            .await
    }

    /// Full per-session log in insertion order, for audit replay
    pub async fn session_log(&self, session_id: SessionId) -> Result<Vec<CoordinationEntry>> {
        self.storage
            .coordination_entries_for_session(session_id)
            .await
    }

    /// Close an entry to a terminal status, recording the response.
    ///
    /// Terminal entries are immutable; closing one again is an invalid
    /// transition.
    pub async fn close_entry(
        &self,
        id: EntryId,
        status: CoordinationStatus,
        response: Option<Value>,
    ) -> Result<CoordinationEntry> {
        if !status.is_terminal() {
            return Err(PlexusError::invalid_input(
                "coordination entries close only to a terminal status",
            ));
        }
        let mut entry = self
            .storage
            .get_coordination_entry(id)
            .await?
            .ok_or_else(|| PlexusError::not_found("coordination_entry", id))?;
        if entry.status.is_terminal() {
            return Err(PlexusError::invalid_transition(
                "coordination_entry",
                entry.status,
                status,
            ));
        }

        entry.status = status;
        entry.response = response;
        entry.completed_at = Some(Utc::now());
        self.storage.update_coordination_entry(&entry).await?;
        debug!("Closed coordination entry {} as {}", id, status);
        Ok(entry)
    }

    /// Point status lookup for a delegated task
    pub async fn check_task_status(&self, work_item_id: WorkItemId) -> Result<TaskStatusReport> {
        let item = self
            .storage
            .get_work_item(work_item_id)
            .await?
            .ok_or_else(|| PlexusError::not_found("work_item", work_item_id))?;
        Ok(TaskStatusReport::from(&item))
    }

    async fn record_assignment(
        &self,
        session_id: SessionId,
        initiator: &AgentId,
        target: &AgentId,
        kind: CoordinationKind,
        task_type: String,
        payload: Value,
        priority: i32,
    ) -> Result<Delegation> {
        let item = self
            .queue
            .create(
                NewWorkItem::new(session_id, task_type.clone(), payload)
                    .with_priority(priority)
                    .with_assignee(target.clone()),
            )
            .await?;

        let entry = CoordinationEntry::new(
            session_id,
            initiator.clone(),
            target.clone(),
            kind,
            format!("task '{task_type}'"),
        )
        .with_request(json!({
            "task_type": task_type,
            "work_item_id": item.id,
        }))
        .with_priority(priority);
        self.storage.append_coordination_entry(&entry).await?;

        info!(
            "{} from '{}' to '{}': work item {}",
            kind, initiator, target, item.id
        );
        Ok(Delegation {
            work_item_id: item.id,
            assigned_agent: target.clone(),
            entry_id: entry.id,
        })
    }

    async fn require_agent(&self, id: &AgentId) -> Result<Agent> {
        self.storage
            .get_agent(id)
            .await?
            .ok_or_else(|| PlexusError::not_found("agent", id.as_str()))
    }

    async fn require_tier(&self, id: &AgentId, tier: AgentTier) -> Result<Agent> {
        let agent = self.require_agent(id).await?;
        if agent.tier != tier {
            return Err(PlexusError::invalid_input(format!(
                "agent '{}' is {} tier, expected {}",
                id, agent.tier, tier
            )));
        }
        Ok(agent)
    }
}

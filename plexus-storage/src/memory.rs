//! Thread-safe in-memory implementation of the storage contract.
//!
//! Features:
//! - Lock-free reads and sharded writes via `DashMap`
//! - Atomic work-item claims (the compare-and-swap the engine relies on)
//! - Ordered pending queue: priority ascending, then deadline ascending
//!   with missing deadlines last
//! - Per-session coordination log preserving insertion order
//!
//! Nothing here persists across process restarts; deployments needing
//! durability implement [`Storage`] over a real database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use plexus_core::id::{AgentId, DeadLetterId, EntryId, SessionId, WorkItemId, WorkflowId};
use plexus_core::{
    Agent, AgentStatus, AgentTier, CoordinationEntry, DeadLetterEntry, DeadLetterFilter,
    PhaseTransition, PlexusError, Result, Session, Storage, WorkItem, WorkItemStatus,
    WorkflowState,
};
use std::cmp::Ordering;
use tracing::debug;

/// In-memory [`Storage`] engine backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    agents: DashMap<AgentId, Agent>,
    work_items: DashMap<WorkItemId, WorkItem>,
    coordination: DashMap<EntryId, CoordinationEntry>,
    /// Per-session entry ids in insertion order
    session_log: DashMap<SessionId, Vec<EntryId>>,
    sessions: DashMap<SessionId, Session>,
    workflows: DashMap<WorkflowId, WorkflowState>,
    transitions: DashMap<WorkflowId, Vec<PhaseTransition>>,
    dead_letters: DashMap<DeadLetterId, DeadLetterEntry>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Queue order: priority ascending, deadline ascending with `None` last,
/// then creation time as the stable tiebreak.
fn queue_order(a: &WorkItem, b: &WorkItem) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| match (a.deadline, b.deadline) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
}

#[async_trait]
impl Storage for MemoryStorage {
    // ========================================================================
    // Agents
    // ========================================================================

    async fn put_agent(&self, agent: &Agent) -> Result<()> {
        self.agents.insert(agent.agent_id.clone(), agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.agents.get(id).map(|a| a.clone()))
    }

    async fn delete_agent(&self, id: &AgentId) -> Result<bool> {
        Ok(self.agents.remove(id).is_some())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self.agents.iter().map(|a| a.clone()).collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn agents_by_tier(&self, tier: AgentTier) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|a| a.tier == tier)
            .map(|a| a.clone())
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn agents_by_capability(&self, capabilities: &[String]) -> Result<Vec<Agent>> {
        let wanted: Vec<&str> = capabilities.iter().map(String::as_str).collect();
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|a| a.has_any_capability(wanted.iter().copied()))
            .map(|a| a.clone())
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn agents_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|a| a.status == status)
            .map(|a| a.clone())
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn count_active_for_agent(&self, agent: &AgentId) -> Result<usize> {
        Ok(self
            .work_items
            .iter()
            .filter(|item| {
                matches!(
                    item.status,
                    WorkItemStatus::Assigned | WorkItemStatus::InProgress
                ) && item.assigned_agent.as_ref() == Some(agent)
            })
            .count())
    }

    // ========================================================================
    // Work items
    // ========================================================================

    async fn put_work_item(&self, item: &WorkItem) -> Result<()> {
        self.work_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_work_item(&self, id: WorkItemId) -> Result<Option<WorkItem>> {
        Ok(self.work_items.get(&id).map(|i| i.clone()))
    }

    async fn claim_work_item(&self, id: WorkItemId, agent: &AgentId) -> Result<WorkItem> {
        // The shard write lock held by `get_mut` makes the check-and-set
        // atomic with respect to concurrent claimers.
        let mut entry = self
            .work_items
            .get_mut(&id)
            .ok_or_else(|| PlexusError::not_found("work_item", id))?;
        let item = entry.value_mut();

        if item.status != WorkItemStatus::Pending {
            return Err(PlexusError::conflict(format!(
                "work item {id} is {}, not pending",
                item.status
            )));
        }
        if let Some(reserved) = &item.assigned_agent {
            if reserved != agent {
                return Err(PlexusError::conflict(format!(
                    "work item {id} is reserved for {reserved}"
                )));
            }
        }

        item.status = WorkItemStatus::Assigned;
        item.assigned_agent = Some(agent.clone());
        item.updated_at = Utc::now();
        debug!(work_item = %id, agent = %agent, "work item claimed");
        Ok(item.clone())
    }

    async fn pending_work_items(
        &self,
        reserved_for: Option<&AgentId>,
        task_types: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<WorkItem>> {
        let mut items: Vec<WorkItem> = self
            .work_items
            .iter()
            .filter(|item| item.status == WorkItemStatus::Pending)
            .filter(|item| match reserved_for {
                Some(agent) => item.assigned_agent.as_ref() == Some(agent),
                None => true,
            })
            .filter(|item| match task_types {
                Some(types) => types.iter().any(|t| *t == item.task_type),
                None => true,
            })
            .map(|item| item.clone())
            .collect();
        items.sort_by(queue_order);
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn work_items_by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>> {
        let mut items: Vec<WorkItem> = self
            .work_items
            .iter()
            .filter(|item| item.status == status)
            .map(|item| item.clone())
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    async fn work_items_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<WorkItem>> {
        let mut items: Vec<WorkItem> = self
            .work_items
            .iter()
            .filter(|item| item.retry_due(now))
            .map(|item| item.clone())
            .collect();
        items.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(items)
    }

    async fn work_items_by_session(&self, session_id: SessionId) -> Result<Vec<WorkItem>> {
        let mut items: Vec<WorkItem> = self
            .work_items
            .iter()
            .filter(|item| item.session_id == session_id)
            .map(|item| item.clone())
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    // ========================================================================
    // Coordination log
    // ========================================================================

    async fn append_coordination_entry(&self, entry: &CoordinationEntry) -> Result<()> {
        let fresh = self.coordination.insert(entry.id, entry.clone()).is_none();
        if fresh {
            self.session_log
                .entry(entry.session_id)
                .or_default()
                .push(entry.id);
        }
        Ok(())
    }

    async fn get_coordination_entry(&self, id: EntryId) -> Result<Option<CoordinationEntry>> {
        Ok(self.coordination.get(&id).map(|e| e.clone()))
    }

    async fn update_coordination_entry(&self, entry: &CoordinationEntry) -> Result<()> {
        let mut existing = self
            .coordination
            .get_mut(&entry.id)
            .ok_or_else(|| PlexusError::not_found("coordination_entry", entry.id))?;
        *existing.value_mut() = entry.clone();
        Ok(())
    }

    async fn coordination_entries_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<CoordinationEntry>> {
        let Some(ids) = self.session_log.get(&session_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.coordination.get(id).map(|e| e.clone()))
            .collect())
    }

    async fn coordination_entries_for_target(
        &self,
        target: &AgentId,
        limit: Option<usize>,
    ) -> Result<Vec<CoordinationEntry>> {
        let mut entries: Vec<CoordinationEntry> = self
            .coordination
            .iter()
            .filter(|e| &e.target == target)
            .map(|e| e.clone())
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    async fn put_session(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    // ========================================================================
    // Workflows
    // ========================================================================

    async fn put_workflow(&self, workflow: &WorkflowState) -> Result<()> {
        self.workflows
            .insert(workflow.workflow_id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<WorkflowState>> {
        Ok(self.workflows.get(&id).map(|w| w.clone()))
    }

    async fn append_phase_transition(&self, transition: &PhaseTransition) -> Result<()> {
        self.transitions
            .entry(transition.workflow_id)
            .or_default()
            .push(transition.clone());
        Ok(())
    }

    async fn phase_transitions(&self, workflow_id: WorkflowId) -> Result<Vec<PhaseTransition>> {
        Ok(self
            .transitions
            .get(&workflow_id)
            .map(|t| t.clone())
            .unwrap_or_default())
    }

    // ========================================================================
    // Dead letters
    // ========================================================================

    async fn put_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        self.dead_letters.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get_dead_letter(&self, id: DeadLetterId) -> Result<Option<DeadLetterEntry>> {
        Ok(self.dead_letters.get(&id).map(|e| e.clone()))
    }

    async fn dead_letters(&self, filter: DeadLetterFilter) -> Result<Vec<DeadLetterEntry>> {
        let mut entries: Vec<DeadLetterEntry> = self
            .dead_letters
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| e.clone())
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}

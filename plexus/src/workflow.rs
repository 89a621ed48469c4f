//! Coordinated multi-phase workflows.
//!
//! A workflow is a named, validated phase graph: each phase becomes one
//! Pending work item reserved for its agent, and a single state row
//! tracks the current phase, status, and monotonic progress. Phase
//! changes are recorded as discrete transition events for replay.

use crate::queue::WorkQueue;
use chrono::Utc;
use plexus_core::error::PlexusError;
use plexus_core::id::WorkflowId;
use plexus_core::traits::Storage;
use plexus_core::types::{
    CreatedWorkflow, NewWorkItem, PhaseSpec, PhaseTransition, WorkflowSpec, WorkflowState,
    WorkflowStatus,
};
use plexus_core::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

pub struct WorkflowEngine {
    storage: Arc<dyn Storage>,
    queue: Arc<WorkQueue>,
}

impl WorkflowEngine {
    pub fn new(storage: Arc<dyn Storage>, queue: Arc<WorkQueue>) -> Self {
        Self { storage, queue }
    }

    /// Validate the phase graph and materialize the workflow.
    ///
    /// Creates one Pending work item per phase, reserved for the phase's
    /// agent and stamped with the workflow id and phase name. Phase order
    /// sets item priority, so earlier phases dispatch first. The state
    /// row starts at the first phase with zero progress.
    pub async fn create_workflow(&self, spec: WorkflowSpec) -> Result<CreatedWorkflow> {
        validate_phases(&spec.phases)?;
        if self.storage.get_session(spec.session_id).await?.is_none() {
            return Err(PlexusError::not_found("session", spec.session_id));
        }

        let workflow_id = WorkflowId::new();
        let mut work_item_ids = Vec::with_capacity(spec.phases.len());
        for (index, phase) in spec.phases.iter().enumerate() {
            let item = self
                .queue
                .create(
                    NewWorkItem::new(spec.session_id, phase.task_type.clone(), phase.payload.clone())
                        .with_priority(index as i32)
                        .with_assignee(phase.agent.clone())
                        .with_workflow(workflow_id, phase.name.clone()),
                )
                .await?;
            work_item_ids.push(item.id);
        }

        let first_phase = spec.phases[0].name.clone();
        let now = Utc::now();
        let state = WorkflowState {
            workflow_id,
            session_id: spec.session_id,
            name: spec.name.clone(),
            current_phase: first_phase.clone(),
            status: WorkflowStatus::Pending,
            progress: 0,
            context: spec.context,
            created_at: now,
            updated_at: now,
        };
        self.storage.put_workflow(&state).await?;
        self.storage
            .append_phase_transition(&PhaseTransition {
                workflow_id,
                from_phase: None,
                to_phase: first_phase,
                at: now,
            })
            .await?;

        info!(
            "Created workflow {} '{}' with {} phases",
            workflow_id,
            spec.name,
            spec.phases.len()
        );
        Ok(CreatedWorkflow {
            workflow_id,
            work_item_ids,
        })
    }

    pub async fn get(&self, id: WorkflowId) -> Result<WorkflowState> {
        self.require(id).await
    }

    /// Recorded phase transitions in order
    pub async fn transitions(&self, id: WorkflowId) -> Result<Vec<PhaseTransition>> {
        self.storage.phase_transitions(id).await
    }

    /// Update progress, optionally moving to a new phase or status.
    ///
    /// Progress is monotonic on a live workflow: lowering it is rejected,
    /// equal values are accepted. A Pending workflow activates on its
    /// first update; a Suspended one must be resumed in the same call
    /// (`status = Active`) or via [`resume`](Self::resume) first. A phase
    /// change records a transition event.
    pub async fn update_progress(
        &self,
        id: WorkflowId,
        progress: u8,
        current_phase: Option<&str>,
        status: Option<WorkflowStatus>,
    ) -> Result<WorkflowState> {
        if progress > 100 {
            return Err(PlexusError::invalid_input("progress must be within 0..=100"));
        }

        let mut workflow = self.require(id).await?;
        if workflow.status.is_terminal() {
            return Err(PlexusError::invalid_transition(
                "workflow",
                workflow.status,
                status.unwrap_or(workflow.status),
            ));
        }
        if progress < workflow.progress {
            return Err(PlexusError::invalid_input(format!(
                "progress on workflow {} cannot decrease ({} -> {})",
                id, workflow.progress, progress
            )));
        }

        match status {
            Some(next) if next != workflow.status => {
                if !workflow.status.can_transition_to(next) {
                    return Err(PlexusError::invalid_transition(
                        "workflow",
                        workflow.status,
                        next,
                    ));
                }
                workflow.status = next;
            }
            Some(_) => {}
            None => match workflow.status {
                // First progress report activates the workflow
                WorkflowStatus::Pending => workflow.status = WorkflowStatus::Active,
                WorkflowStatus::Suspended => {
                    return Err(PlexusError::invalid_input(format!(
                        "workflow {id} is suspended; resume it before updating progress"
                    )));
                }
                _ => {}
            },
        }

        let now = Utc::now();
        if let Some(phase) = current_phase {
            if phase != workflow.current_phase {
                self.storage
                    .append_phase_transition(&PhaseTransition {
                        workflow_id: id,
                        from_phase: Some(workflow.current_phase.clone()),
                        to_phase: phase.to_string(),
                        at: now,
                    })
                    .await?;
                debug!(
                    "Workflow {} phase {} -> {}",
                    id, workflow.current_phase, phase
                );
                workflow.current_phase = phase.to_string();
            }
        }

        workflow.progress = progress;
        workflow.updated_at = now;
        self.storage.put_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Pause the workflow awaiting external input (data-level state;
    /// nothing blocks)
    pub async fn suspend(&self, id: WorkflowId) -> Result<WorkflowState> {
        self.set_status(id, WorkflowStatus::Suspended).await
    }

    pub async fn resume(&self, id: WorkflowId) -> Result<WorkflowState> {
        self.set_status(id, WorkflowStatus::Active).await
    }

    /// Terminal success; progress is forced to 100
    pub async fn complete(&self, id: WorkflowId) -> Result<WorkflowState> {
        let mut workflow = self.set_status(id, WorkflowStatus::Completed).await?;
        workflow.progress = 100;
        workflow.updated_at = Utc::now();
        self.storage.put_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Terminal failure; recorded phases and progress are preserved
    pub async fn fail(&self, id: WorkflowId) -> Result<WorkflowState> {
        self.set_status(id, WorkflowStatus::Failed).await
    }

    async fn set_status(&self, id: WorkflowId, status: WorkflowStatus) -> Result<WorkflowState> {
        let mut workflow = self.require(id).await?;
        if !workflow.status.can_transition_to(status) {
            return Err(PlexusError::invalid_transition(
                "workflow",
                workflow.status,
                status,
            ));
        }
        info!("Workflow {} status {} -> {}", id, workflow.status, status);
        workflow.status = status;
        workflow.updated_at = Utc::now();
        self.storage.put_workflow(&workflow).await?;
        Ok(workflow)
    }

    async fn require(&self, id: WorkflowId) -> Result<WorkflowState> {
        self.storage
            .get_workflow(id)
            .await?
            .ok_or_else(|| PlexusError::not_found("workflow", id))
    }
}

fn validate_phases(phases: &[PhaseSpec]) -> Result<()> {
    if phases.is_empty() {
        return Err(PlexusError::invalid_input(
            "workflow requires at least one phase",
        ));
    }

    let mut names: HashSet<&str> = HashSet::new();
    for phase in phases {
        if phase.name.trim().is_empty() {
            return Err(PlexusError::invalid_input("phase name must not be empty"));
        }
        if !names.insert(phase.name.as_str()) {
            return Err(PlexusError::invalid_input(format!(
                "duplicate phase name '{}'",
                phase.name
            )));
        }
    }
    for phase in phases {
        for dep in &phase.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(PlexusError::invalid_input(format!(
                    "phase '{}' depends on unknown phase '{dep}'",
                    phase.name
                )));
            }
        }
    }

    let deps: HashMap<&str, &[String]> = phases
        .iter()
        .map(|p| (p.name.as_str(), p.depends_on.as_slice()))
        .collect();
    let mut visited = HashSet::new();
    let mut stack = HashSet::new();
    for phase in phases {
        if !visited.contains(phase.name.as_str())
            && has_cycle(phase.name.as_str(), &deps, &mut visited, &mut stack)
        {
            return Err(PlexusError::invalid_input(format!(
                "dependency cycle through phase '{}'",
                phase.name
            )));
        }
    }
    Ok(())
}

fn has_cycle<'a>(
    name: &'a str,
    deps: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashSet<&'a str>,
    stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(name);
    stack.insert(name);

    if let Some(list) = deps.get(name) {
        for dep in list.iter() {
            let dep = dep.as_str();
            if !visited.contains(dep) {
                if has_cycle(dep, deps, visited, stack) {
                    return true;
                }
            } else if stack.contains(dep) {
                return true;
            }
        }
    }

    stack.remove(name);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::DeadLetterQueue;
    use crate::resilience::RetryPolicy;
    use plexus_core::config::QueueConfig;
    use plexus_core::id::{AgentId, SessionId};
    use plexus_core::traits::TracingNotifier;
    use plexus_core::types::{Session, WorkItemStatus};
    use plexus_storage::MemoryStorage;
    use serde_json::json;

    struct Fixture {
        engine: WorkflowEngine,
        queue: Arc<WorkQueue>,
        session: SessionId,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let dlq = Arc::new(DeadLetterQueue::new(
            storage.clone(),
            Arc::new(TracingNotifier),
        ));
        let queue = Arc::new(WorkQueue::new(
            storage.clone(),
            dlq,
            QueueConfig::default(),
            RetryPolicy::default(),
        ));
        let engine = WorkflowEngine::new(storage.clone(), queue.clone());

        let session = Session::new("user-1", AgentId::new("orchestrator-1"), json!({}));
        storage.put_session(&session).await.unwrap();

        Fixture {
            engine,
            queue,
            session: session.session_id,
        }
    }

    fn three_phase_spec(session: SessionId) -> WorkflowSpec {
        WorkflowSpec::new("proposal-draft", session)
            .phase(PhaseSpec::new(
                "scan",
                AgentId::new("scanner-1"),
                "rfp_scan",
                json!({"doc": "rfp-2024-001"}),
            ))
            .phase(
                PhaseSpec::new(
                    "draft",
                    AgentId::new("writer-1"),
                    "draft_section",
                    json!({"section": "L"}),
                )
                .depends_on("scan"),
            )
            .phase(
                PhaseSpec::new(
                    "review",
                    AgentId::new("reviewer-1"),
                    "compliance_review",
                    json!({}),
                )
                .depends_on("draft"),
            )
    }

    #[tokio::test]
    async fn test_create_three_phase_workflow() {
        let f = fixture().await;
        let created = f
            .engine
            .create_workflow(three_phase_spec(f.session))
            .await
            .unwrap();
        assert_eq!(created.work_item_ids.len(), 3);

        let state = f.engine.get(created.workflow_id).await.unwrap();
        assert_eq!(state.current_phase, "scan");
        assert_eq!(state.progress, 0);
        assert_eq!(state.status, WorkflowStatus::Pending);

        // One reserved Pending item per phase, priority following phase order
        let items = f.queue.by_session(f.session).await.unwrap();
        assert_eq!(items.len(), 3);
        let scan = items
            .iter()
            .find(|i| i.phase.as_deref() == Some("scan"))
            .unwrap();
        assert_eq!(scan.status, WorkItemStatus::Pending);
        assert_eq!(scan.assigned_agent, Some(AgentId::new("scanner-1")));
        assert_eq!(scan.workflow_id, Some(created.workflow_id));
        assert_eq!(scan.priority, 0);
        let review = items
            .iter()
            .find(|i| i.phase.as_deref() == Some("review"))
            .unwrap();
        assert_eq!(review.priority, 2);

        // The initial transition into the first phase is recorded
        let transitions = f.engine.transitions(created.workflow_id).await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from_phase, None);
        assert_eq!(transitions[0].to_phase, "scan");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_graphs() {
        let f = fixture().await;

        let empty = WorkflowSpec::new("empty", f.session);
        assert!(matches!(
            f.engine.create_workflow(empty).await.unwrap_err(),
            PlexusError::InvalidInput(_)
        ));

        let duplicate = WorkflowSpec::new("dup", f.session)
            .phase(PhaseSpec::new("a", AgentId::new("x"), "t", json!({})))
            .phase(PhaseSpec::new("a", AgentId::new("y"), "t", json!({})));
        assert!(matches!(
            f.engine.create_workflow(duplicate).await.unwrap_err(),
            PlexusError::InvalidInput(_)
        ));

        let unknown = WorkflowSpec::new("unknown", f.session).phase(
            PhaseSpec::new("a", AgentId::new("x"), "t", json!({})).depends_on("ghost"),
        );
        assert!(matches!(
            f.engine.create_workflow(unknown).await.unwrap_err(),
            PlexusError::InvalidInput(_)
        ));

        let cyclic = WorkflowSpec::new("cycle", f.session)
            .phase(PhaseSpec::new("a", AgentId::new("x"), "t", json!({})).depends_on("b"))
            .phase(PhaseSpec::new("b", AgentId::new("y"), "t", json!({})).depends_on("a"));
        assert!(matches!(
            f.engine.create_workflow(cyclic).await.unwrap_err(),
            PlexusError::InvalidInput(_)
        ));

        // Nothing was persisted for the rejected specs
        assert!(f.queue.by_session(f.session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_session() {
        let f = fixture().await;
        let err = f
            .engine
            .create_workflow(three_phase_spec(SessionId::new()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let f = fixture().await;
        let created = f
            .engine
            .create_workflow(three_phase_spec(f.session))
            .await
            .unwrap();
        let id = created.workflow_id;

        // First update activates the Pending workflow
        let state = f.engine.update_progress(id, 30, None, None).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Active);
        assert_eq!(state.progress, 30);

        // Equal progress is fine
        f.engine.update_progress(id, 30, None, None).await.unwrap();

        // Backward progress is rejected, state is untouched
        let err = f.engine.update_progress(id, 10, None, None).await.unwrap_err();
        assert!(matches!(err, PlexusError::InvalidInput(_)));
        assert_eq!(f.engine.get(id).await.unwrap().progress, 30);

        let err = f.engine.update_progress(id, 101, None, None).await.unwrap_err();
        assert!(matches!(err, PlexusError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_phase_change_records_transition() {
        let f = fixture().await;
        let created = f
            .engine
            .create_workflow(three_phase_spec(f.session))
            .await
            .unwrap();
        let id = created.workflow_id;

        let state = f
            .engine
            .update_progress(id, 40, Some("draft"), None)
            .await
            .unwrap();
        assert_eq!(state.current_phase, "draft");

        let transitions = f.engine.transitions(id).await.unwrap();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[1].from_phase.as_deref(), Some("scan"));
        assert_eq!(transitions[1].to_phase, "draft");

        // Same phase again records nothing new
        f.engine.update_progress(id, 45, Some("draft"), None).await.unwrap();
        assert_eq!(f.engine.transitions(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_suspend_resume_cycle() {
        let f = fixture().await;
        let created = f
            .engine
            .create_workflow(three_phase_spec(f.session))
            .await
            .unwrap();
        let id = created.workflow_id;
        f.engine.update_progress(id, 50, None, None).await.unwrap();

        let suspended = f.engine.suspend(id).await.unwrap();
        assert_eq!(suspended.status, WorkflowStatus::Suspended);
        assert_eq!(suspended.progress, 50);

        // Progress while suspended requires an explicit resume
        let err = f.engine.update_progress(id, 60, None, None).await.unwrap_err();
        assert!(matches!(err, PlexusError::InvalidInput(_)));

        // Resume-with-progress in one call is allowed
        let resumed = f
            .engine
            .update_progress(id, 60, None, Some(WorkflowStatus::Active))
            .await
            .unwrap();
        assert_eq!(resumed.status, WorkflowStatus::Active);
        assert_eq!(resumed.progress, 60);
    }

    #[tokio::test]
    async fn test_terminal_states() {
        let f = fixture().await;
        let created = f
            .engine
            .create_workflow(three_phase_spec(f.session))
            .await
            .unwrap();
        let id = created.workflow_id;
        f.engine.update_progress(id, 80, Some("review"), None).await.unwrap();

        let done = f.engine.complete(id).await.unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);
        assert_eq!(done.progress, 100);

        // Terminal workflows are frozen
        let err = f.engine.update_progress(id, 100, None, None).await.unwrap_err();
        assert!(err.is_invalid_transition());
        let err = f.engine.suspend(id).await.unwrap_err();
        assert!(err.is_invalid_transition());

        // A failed workflow keeps its partial progress
        let other = f
            .engine
            .create_workflow(three_phase_spec(f.session))
            .await
            .unwrap();
        f.engine
            .update_progress(other.workflow_id, 40, None, None)
            .await
            .unwrap();
        let failed = f.engine.fail(other.workflow_id).await.unwrap();
        assert_eq!(failed.status, WorkflowStatus::Failed);
        assert_eq!(failed.progress, 40);
    }
}

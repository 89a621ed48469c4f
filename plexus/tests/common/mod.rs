//! Common test utilities for Plexus integration tests.
//!
//! Provides stub task executors and fixture helpers for wiring a
//! coordinator over in-memory storage with a few registered agents.

use async_trait::async_trait;
use plexus::prelude::*;
use plexus::Coordinator;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Executor that succeeds immediately, echoing the task type back.
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(
        &self,
        task_type: &str,
        payload: &Value,
    ) -> std::result::Result<Value, TaskError> {
        Ok(json!({ "task": task_type, "echo": payload }))
    }
}

/// Executor that always fails with a permanent error.
pub struct AlwaysFailExecutor;

#[async_trait]
impl TaskExecutor for AlwaysFailExecutor {
    async fn execute(
        &self,
        task_type: &str,
        _payload: &Value,
    ) -> std::result::Result<Value, TaskError> {
        Err(TaskError::fatal(format!("task '{task_type}' is doomed")))
    }
}

pub async fn register_orchestrator(coordinator: &Coordinator, id: &str) -> AgentId {
    let agent_id = AgentId::new(id);
    coordinator
        .registry()
        .register(
            agent_id.clone(),
            AgentTier::Orchestrator,
            ["plan".to_string()],
            4,
        )
        .await
        .unwrap();
    agent_id
}

pub async fn register_specialist(
    coordinator: &Coordinator,
    id: &str,
    capabilities: &[&str],
    max_concurrency: usize,
) -> AgentId {
    let agent_id = AgentId::new(id);
    coordinator
        .registry()
        .register(
            agent_id.clone(),
            AgentTier::Specialist,
            capabilities.iter().map(|c| c.to_string()),
            max_concurrency,
        )
        .await
        .unwrap();
    agent_id
}

/// Register an orchestrator and open a session owned by it.
pub async fn open_session(coordinator: &Coordinator) -> SessionId {
    let orchestrator = register_orchestrator(coordinator, "orchestrator-1").await;
    coordinator
        .sessions()
        .create("user-1", &orchestrator, json!({}))
        .await
        .unwrap()
        .session_id
}

/// Poll the queue until the item reaches `status` or the budget runs out.
pub async fn wait_for_status(
    coordinator: &Coordinator,
    id: WorkItemId,
    status: WorkItemStatus,
) -> WorkItem {
    for _ in 0..2000 {
        let current = coordinator.queue().get(id).await.unwrap();
        if current.status == status {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("work item {id} never reached {status}");
}

/// Coordinator over in-memory storage with the given executor.
pub fn harness(executor: Arc<dyn TaskExecutor>) -> Coordinator {
    Coordinator::in_memory(executor)
}

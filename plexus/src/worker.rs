//! Autonomous per-agent work consumers.
//!
//! Each registered agent gets an [`AgentWorker`]: a tokio task that polls
//! the queue for eligible items, claims one at a time, and drives it
//! through execution. The external [`TaskExecutor`] call is wrapped in the
//! named circuit breaker for the item's task type and the configured retry
//! policy, so a flapping dependency backs off without stalling other
//! agents. [`WorkerPool`] owns the spawned workers and fans shutdown out
//! to them.

use crate::queue::WorkQueue;
use crate::registry::AgentRegistry;
use crate::resilience::{retry_with_hook, BreakerRegistry, RetryPolicy};
use crate::session::SessionManager;
use plexus_core::config::WorkerConfig;
use plexus_core::error::{PlexusError, TaskError};
use plexus_core::id::AgentId;
use plexus_core::traits::TaskExecutor;
use plexus_core::types::{Agent, WorkItem};
use plexus_core::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many pending candidates to fetch per cycle. More than one so a
/// lost claim race still leaves something to try this cycle.
const CLAIM_CANDIDATES: usize = 8;

pub struct AgentWorker {
    agent_id: AgentId,
    registry: Arc<AgentRegistry>,
    queue: Arc<WorkQueue>,
    sessions: Arc<SessionManager>,
    breakers: Arc<BreakerRegistry>,
    executor: Arc<dyn TaskExecutor>,
    retry: RetryPolicy,
    config: WorkerConfig,
}

impl AgentWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: AgentId,
        registry: Arc<AgentRegistry>,
        queue: Arc<WorkQueue>,
        sessions: Arc<SessionManager>,
        breakers: Arc<BreakerRegistry>,
        executor: Arc<dyn TaskExecutor>,
        retry: RetryPolicy,
        config: WorkerConfig,
    ) -> Self {
        Self {
            agent_id,
            registry,
            queue,
            sessions,
            breakers,
            executor,
            retry,
            config,
        }
    }

    /// Start the poll loop on a new tokio task.
    ///
    /// The loop runs one cycle, sleeps for the poll interval, and repeats
    /// until the token is cancelled. Cancellation also races any in-flight
    /// executor call, so shutdown is not held hostage by a stuck task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(&self, shutdown: CancellationToken) {
        info!("Worker for agent '{}' started", self.agent_id);
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match self.cycle(&shutdown).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(
                        "Agent '{}' is no longer registered, worker stopping",
                        self.agent_id
                    );
                    return;
                }
                Err(e) => {
                    warn!("Worker cycle for agent '{}' failed: {}", self.agent_id, e);
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
        info!("Worker for agent '{}' stopped", self.agent_id);
    }

    /// One poll cycle: heartbeat, saturation check, claim, execute.
    async fn cycle(&self, shutdown: &CancellationToken) -> Result<()> {
        self.registry.heartbeat(&self.agent_id).await?;
        let agent = self.registry.get(&self.agent_id).await?;

        let load = self.registry.current_load(&self.agent_id).await?;
        if load >= agent.max_concurrency {
            debug!(
                "Agent '{}' saturated ({}/{}), skipping cycle",
                self.agent_id, load, agent.max_concurrency
            );
            return Ok(());
        }

        let Some(item) = self.claim_next(&agent).await? else {
            return Ok(());
        };
        self.process(item, shutdown).await
    }

    /// Claim the best eligible pending item, if any.
    ///
    /// Eligible means reserved for this agent (any task type), or
    /// unreserved with a task type inside the agent's capability set.
    /// A lost claim race is normal under contention; move to the next
    /// candidate.
    async fn claim_next(&self, agent: &Agent) -> Result<Option<WorkItem>> {
        let mut candidates = self
            .queue
            .pending(Some(&self.agent_id), None, Some(CLAIM_CANDIDATES))
            .await?;
        let capabilities: Vec<String> = agent.capabilities.iter().cloned().collect();
        let open = self
            .queue
            .pending(None, Some(&capabilities), Some(CLAIM_CANDIDATES))
            .await?;
        candidates.extend(open.into_iter().filter(|i| i.assigned_agent.is_none()));

        for candidate in candidates {
            match self.queue.claim(candidate.id, &self.agent_id).await {
                Ok(item) => return Ok(Some(item)),
                Err(e) if e.is_conflict() || e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Drive a claimed item to Completed or Failed and touch its session.
    async fn process(&self, item: WorkItem, shutdown: &CancellationToken) -> Result<()> {
        let item = self.queue.start(item.id, &self.agent_id).await?;
        info!(
            "Agent '{}' executing work item {} ({})",
            self.agent_id, item.id, item.task_type
        );

        let attempts = AtomicU32::new(1);
        let breaker = self.breakers.get(&item.task_type);
        let outcome = breaker
            .execute(|| self.attempt_all(&item, &attempts, shutdown))
            .await;

        match outcome {
            Ok(result) => {
                self.queue.complete(item.id, result).await?;
                info!("Agent '{}' completed work item {}", self.agent_id, item.id);
            }
            Err(PlexusError::Task(task_err)) => {
                let made = attempts.load(Ordering::Relaxed);
                let message = if made > 1 {
                    PlexusError::retry_exhausted(made, task_err).to_string()
                } else {
                    task_err.to_string()
                };
                warn!(
                    "Agent '{}' failed work item {}: {}",
                    self.agent_id, item.id, message
                );
                self.queue.fail(item.id, message).await?;
            }
            // Circuit open: fail without burning executor calls; the
            // queue-level retry schedule spaces the next attempt out past
            // the breaker's recovery window
            Err(e) => {
                warn!(
                    "Agent '{}' could not execute work item {}: {}",
                    self.agent_id, item.id, e
                );
                self.queue.fail(item.id, e.to_string()).await?;
            }
        }

        if let Err(e) = self.sessions.touch(item.session_id).await {
            debug!("Session touch for {} failed: {}", item.session_id, e);
        }
        Ok(())
    }

    /// The full retried execution of one item, as seen by the breaker.
    async fn attempt_all(
        &self,
        item: &WorkItem,
        attempts: &AtomicU32,
        shutdown: &CancellationToken,
    ) -> std::result::Result<Value, TaskError> {
        retry_with_hook(
            &self.retry,
            || self.attempt_once(item, shutdown),
            |_, attempt, _| attempts.store(attempt + 1, Ordering::Relaxed),
        )
        .await
    }

    /// One executor call under the per-attempt time budget, racing the
    /// shutdown token.
    async fn attempt_once(
        &self,
        item: &WorkItem,
        shutdown: &CancellationToken,
    ) -> std::result::Result<Value, TaskError> {
        let call = self.executor.execute(&item.task_type, &item.payload);
        tokio::select! {
            _ = shutdown.cancelled() => Err(TaskError::cancelled(format!(
                "shutdown while executing work item {}",
                item.id
            ))),
            result = tokio::time::timeout(self.config.task_timeout(), call) => match result {
                Ok(inner) => inner,
                Err(_) => Err(TaskError::timeout(format!(
                    "task '{}' exceeded {:?}",
                    item.task_type,
                    self.config.task_timeout()
                ))),
            },
        }
    }
}

// ============================================================================
// Worker pool
// ============================================================================

/// Owns the spawned workers and their shared shutdown token.
pub struct WorkerPool {
    shutdown: CancellationToken,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker under this pool's shutdown token
    pub fn attach(&self, worker: AgentWorker) {
        let handle = worker.spawn(self.shutdown.child_token());
        self.handles.lock().push(handle);
    }

    pub fn worker_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Cancel all workers and wait for them to finish their current
    /// cycle.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        info!("Worker pool stopping {} workers", handles.len());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker task did not shut down cleanly: {}", e);
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

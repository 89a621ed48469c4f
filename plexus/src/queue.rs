//! Prioritized work queue with atomic claiming and retry scheduling.
//!
//! Items move through the legal lifecycle graph only; the claim is a
//! storage-level conditional update so two dispatchers can never win the
//! same item. Failures are rescheduled on the shared backoff schedule
//! until the per-item budget runs out, at which point the item is buried
//! in the dead letter queue.

use crate::dlq::DeadLetterQueue;
use crate::resilience::RetryPolicy;
use chrono::{DateTime, Utc};
use plexus_core::config::QueueConfig;
use plexus_core::error::PlexusError;
use plexus_core::id::{AgentId, SessionId, WorkItemId};
use plexus_core::traits::Storage;
use plexus_core::types::{NewWorkItem, WorkItem, WorkItemStatus};
use plexus_core::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct WorkQueue {
    storage: Arc<dyn Storage>,
    dlq: Arc<DeadLetterQueue>,
    config: QueueConfig,
    /// Backoff schedule shared with the in-call retry executor so
    /// `next_retry_at` follows the same curve
    retry_schedule: RetryPolicy,
}

impl WorkQueue {
    pub fn new(
        storage: Arc<dyn Storage>,
        dlq: Arc<DeadLetterQueue>,
        config: QueueConfig,
        retry_schedule: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            dlq,
            config,
            retry_schedule,
        }
    }

    /// Enqueue a new Pending work item.
    ///
    /// The owning session must exist; a pre-assigned agent is recorded as
    /// a reservation honored by the claim.
    pub async fn create(&self, spec: NewWorkItem) -> Result<WorkItem> {
        if spec.task_type.trim().is_empty() {
            return Err(PlexusError::invalid_input("task_type must not be empty"));
        }
        if self.storage.get_session(spec.session_id).await?.is_none() {
            return Err(PlexusError::not_found("session", spec.session_id));
        }

        let item = WorkItem::new(spec);
        self.storage.put_work_item(&item).await?;
        debug!(
            "Created work item {} (type '{}', priority {})",
            item.id, item.task_type, item.priority
        );
        Ok(item)
    }

    pub async fn get(&self, id: WorkItemId) -> Result<WorkItem> {
        self.require(id).await
    }

    /// Atomically claim a Pending item for an agent.
    ///
    /// Exactly one concurrent claimer wins; losers get
    /// [`PlexusError::Conflict`].
    pub async fn claim(&self, id: WorkItemId, agent: &AgentId) -> Result<WorkItem> {
        let item = self.storage.claim_work_item(id, agent).await?;
        debug!("Agent '{}' claimed work item {}", agent, id);
        Ok(item)
    }

    /// Begin execution of a claimed item (`Assigned -> InProgress`).
    /// The caller must be the claiming agent.
    pub async fn start(&self, id: WorkItemId, agent: &AgentId) -> Result<WorkItem> {
        let mut item = self.require(id).await?;
        if item.status != WorkItemStatus::Assigned {
            return Err(PlexusError::invalid_transition(
                "work_item",
                item.status,
                WorkItemStatus::InProgress,
            ));
        }
        if item.assigned_agent.as_ref() != Some(agent) {
            return Err(PlexusError::conflict(format!(
                "work item {id} is assigned to a different agent"
            )));
        }
        item.status = WorkItemStatus::InProgress;
        item.updated_at = Utc::now();
        self.storage.put_work_item(&item).await?;
        debug!("Agent '{}' started work item {}", agent, id);
        Ok(item)
    }

    /// Record successful completion and its result document
    pub async fn complete(&self, id: WorkItemId, result: Value) -> Result<WorkItem> {
        let mut item = self.require(id).await?;
        if !item.status.can_transition_to(WorkItemStatus::Completed) {
            return Err(PlexusError::invalid_transition(
                "work_item",
                item.status,
                WorkItemStatus::Completed,
            ));
        }
        let now = Utc::now();
        item.status = WorkItemStatus::Completed;
        item.result = Some(result);
        item.completed_at = Some(now);
        item.updated_at = now;
        self.storage.put_work_item(&item).await?;
        info!("Completed work item {} ({})", id, item.task_type);
        Ok(item)
    }

    /// Record a failed execution.
    ///
    /// Increments the retry count and either schedules the next attempt
    /// on the shared backoff curve or, once the budget is spent (or the
    /// item opted out of retries), buries the item in the dead letter
    /// queue. Returns the item in its post-failure state.
    pub async fn fail(&self, id: WorkItemId, error: impl Into<String>) -> Result<WorkItem> {
        let mut item = self.require(id).await?;
        if !item.status.can_transition_to(WorkItemStatus::Failed) {
            return Err(PlexusError::invalid_transition(
                "work_item",
                item.status,
                WorkItemStatus::Failed,
            ));
        }

        let error = error.into();
        let now = Utc::now();
        item.status = WorkItemStatus::Failed;
        item.error = Some(error.clone());
        item.retries += 1;
        item.updated_at = now;

        let exhausted = !item.can_retry || item.retries >= self.config.max_retries;
        if exhausted {
            item.next_retry_at = None;
            self.storage.put_work_item(&item).await?;
            let reason = format!(
                "retry budget exhausted after {} attempts: {}",
                item.retries, error
            );
            self.dlq.bury(&item, reason).await?;
            return self.require(id).await;
        }

        let delay = self.retry_schedule.delay_for(item.retries);
        item.next_retry_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
        self.storage.put_work_item(&item).await?;
        warn!(
            "Work item {} failed (attempt {}/{}), next retry in {:?}: {}",
            id, item.retries, self.config.max_retries, delay, error
        );
        Ok(item)
    }

    /// Hand a claimed-but-unstarted item back to the queue
    /// (`Assigned -> Pending`), clearing the assignee.
    pub async fn release(&self, id: WorkItemId) -> Result<WorkItem> {
        let mut item = self.require(id).await?;
        if item.status != WorkItemStatus::Assigned {
            return Err(PlexusError::invalid_transition(
                "work_item",
                item.status,
                WorkItemStatus::Pending,
            ));
        }
        item.status = WorkItemStatus::Pending;
        item.assigned_agent = None;
        item.updated_at = Utc::now();
        self.storage.put_work_item(&item).await?;
        debug!("Released work item {} back to pending", id);
        Ok(item)
    }

    /// Pending items in dispatch order, optionally filtered by reservation
    /// and task types
    pub async fn pending(
        &self,
        reserved_for: Option<&AgentId>,
        task_types: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<WorkItem>> {
        self.storage
            .pending_work_items(reserved_for, task_types, limit)
            .await
    }

    pub async fn by_status(&self, status: WorkItemStatus) -> Result<Vec<WorkItem>> {
        self.storage.work_items_by_status(status).await
    }

    pub async fn by_session(&self, session_id: SessionId) -> Result<Vec<WorkItem>> {
        self.storage.work_items_by_session(session_id).await
    }

    /// Failed items whose next attempt is due at `now`
    pub async fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<WorkItem>> {
        self.storage.work_items_for_retry(now).await
    }

    /// Move due failed items back to Pending (the retry edge).
    ///
    /// Clears the assignee so any capable agent can pick the retry up.
    /// Returns the ids that were requeued.
    pub async fn requeue_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkItemId>> {
        let due = self.storage.work_items_for_retry(now).await?;
        let mut requeued = Vec::with_capacity(due.len());
        for mut item in due {
            item.status = WorkItemStatus::Pending;
            item.assigned_agent = None;
            item.next_retry_at = None;
            item.updated_at = Utc::now();
            self.storage.put_work_item(&item).await?;
            requeued.push(item.id);
        }
        if !requeued.is_empty() {
            info!("Requeued {} failed work items for retry", requeued.len());
        }
        Ok(requeued)
    }

    /// Run [`requeue_due`](Self::requeue_due) on the configured interval
    /// until the token is cancelled.
    pub fn spawn_requeue_sweeper(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let interval = queue.config.requeue_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Requeue sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = queue.requeue_due(Utc::now()).await {
                            warn!("Requeue sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    async fn require(&self, id: WorkItemId) -> Result<WorkItem> {
        self.storage
            .get_work_item(id)
            .await?
            .ok_or_else(|| PlexusError::not_found("work_item", id))
    }
}

//! Dead letter queue: terminal parking for work items that exhausted
//! their retry budget.
//!
//! Entries are append-only. `reprocess` hands back the original item
//! snapshot for the caller to act on; `resubmit` additionally enqueues a
//! fresh clone; `escalate` closes the entry for human attention. Nothing
//! here is ever deleted.

use chrono::Utc;
use plexus_core::error::PlexusError;
use plexus_core::id::DeadLetterId;
use plexus_core::traits::{NotificationSink, Storage};
use plexus_core::types::{
    DeadLetterEntry, DeadLetterFilter, NewWorkItem, Notification, WorkItem, WorkItemStatus,
};
use plexus_core::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DeadLetterQueue {
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn NotificationSink>,
}

impl DeadLetterQueue {
    pub fn new(storage: Arc<dyn Storage>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { storage, notifier }
    }

    /// Bury a failed work item.
    ///
    /// Creates the dead letter entry, flips the item to `DeadLettered`,
    /// and emits a critical notification on a best-effort basis. Only
    /// `Failed` items can be buried.
    pub async fn bury(&self, item: &WorkItem, reason: impl Into<String>) -> Result<DeadLetterEntry> {
        if !item.status.can_transition_to(WorkItemStatus::DeadLettered) {
            return Err(PlexusError::invalid_transition(
                "work_item",
                item.status,
                WorkItemStatus::DeadLettered,
            ));
        }

        let reason = reason.into();
        let entry = DeadLetterEntry::new(item, reason.clone());
        self.storage.put_dead_letter(&entry).await?;

        let mut buried = item.clone();
        buried.status = WorkItemStatus::DeadLettered;
        buried.dead_lettered = true;
        buried.can_retry = false;
        buried.next_retry_at = None;
        buried.updated_at = Utc::now();
        self.storage.put_work_item(&buried).await?;

        warn!(
            "Dead-lettered work item {} ({}) after {} retries: {}",
            item.id, item.task_type, item.retries, reason
        );

        let note = Notification::critical(format!(
            "Work item '{}' moved to dead letter queue: {}",
            item.task_type, reason
        ))
        .for_session(item.session_id)
        .for_work_item(item.id);
        if let Err(e) = self.notifier.notify(&note).await {
            warn!("Dead letter notification failed: {}", e);
        }

        Ok(entry)
    }

    pub async fn get(&self, id: DeadLetterId) -> Result<DeadLetterEntry> {
        self.require(id).await
    }

    /// Entries matching the filter, newest first
    pub async fn entries(&self, filter: DeadLetterFilter) -> Result<Vec<DeadLetterEntry>> {
        self.storage.dead_letters(filter).await
    }

    /// Mark an entry for human attention.
    ///
    /// Escalation is terminal: the entry stops being reprocessable and a
    /// second escalation is a conflict.
    pub async fn escalate(
        &self,
        id: DeadLetterId,
        reason: impl Into<String>,
    ) -> Result<DeadLetterEntry> {
        let mut entry = self.require(id).await?;
        if entry.is_escalated() {
            return Err(PlexusError::conflict(format!(
                "dead letter entry {id} is already escalated"
            )));
        }

        let reason = reason.into();
        entry.escalated_at = Some(Utc::now());
        entry.escalation_reason = Some(reason.clone());
        entry.can_reprocess = false;
        self.storage.put_dead_letter(&entry).await?;

        warn!("Escalated dead letter entry {}: {}", id, reason);
        let note = Notification::critical(format!(
            "Dead-lettered task '{}' escalated: {}",
            entry.task_type, reason
        ))
        .for_session(entry.session_id)
        .for_work_item(entry.work_item_id);
        if let Err(e) = self.notifier.notify(&note).await {
            warn!("Escalation notification failed: {}", e);
        }

        Ok(entry)
    }

    /// Record a reprocess attempt and return the updated entry plus the
    /// original work item snapshot.
    ///
    /// Nothing is re-enqueued here; the caller decides what to do with the
    /// snapshot (see [`resubmit`](Self::resubmit)).
    pub async fn reprocess(
        &self,
        id: DeadLetterId,
        triggered_by: impl Into<String>,
    ) -> Result<(DeadLetterEntry, WorkItem)> {
        let mut entry = self.require(id).await?;
        if !entry.can_reprocess {
            return Err(PlexusError::invalid_input(format!(
                "dead letter entry {id} is not reprocessable"
            )));
        }

        let item = self
            .storage
            .get_work_item(entry.work_item_id)
            .await?
            .ok_or_else(|| PlexusError::not_found("work_item", entry.work_item_id))?;

        let triggered_by = triggered_by.into();
        entry.reprocess_attempts += 1;
        entry.last_reprocessed_at = Some(Utc::now());
        entry.last_reprocessed_by = Some(triggered_by.clone());
        self.storage.put_dead_letter(&entry).await?;

        info!(
            "Reprocess attempt {} on dead letter entry {} by '{}'",
            entry.reprocess_attempts, id, triggered_by
        );
        Ok((entry, item))
    }

    /// Reprocess and enqueue a fresh Pending clone of the original item.
    ///
    /// The clone keeps the task type, payload, priority, deadline, and
    /// workflow linkage, but starts with a clean retry budget and no
    /// assignee. The buried original stays `DeadLettered` for audit.
    pub async fn resubmit(
        &self,
        id: DeadLetterId,
        triggered_by: impl Into<String>,
    ) -> Result<WorkItem> {
        let (_, original) = self.reprocess(id, triggered_by).await?;

        let mut spec = NewWorkItem::new(
            original.session_id,
            original.task_type.clone(),
            original.payload.clone(),
        )
        .with_priority(original.priority);
        if let Some(deadline) = original.deadline {
            spec = spec.with_deadline(deadline);
        }
        if let (Some(workflow_id), Some(phase)) = (original.workflow_id, original.phase.clone()) {
            spec = spec.with_workflow(workflow_id, phase);
        }

        let fresh = WorkItem::new(spec);
        self.storage.put_work_item(&fresh).await?;
        info!(
            "Resubmitted dead-lettered item {} as fresh item {}",
            original.id, fresh.id
        );
        Ok(fresh)
    }

    async fn require(&self, id: DeadLetterId) -> Result<DeadLetterEntry> {
        self.storage
            .get_dead_letter(id)
            .await?
            .ok_or_else(|| PlexusError::not_found("dead_letter", id))
    }
}

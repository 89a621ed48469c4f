//! Dead letter queue entries.

use crate::id::{DeadLetterId, SessionId, WorkItemId};
use crate::types::work_item::WorkItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A work item buried after exhausting its retry budget.
///
/// Entries are append-only: reprocessing and escalation stamp fields but
/// nothing is ever deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    pub work_item_id: WorkItemId,
    pub session_id: SessionId,
    pub task_type: String,
    pub failure_reason: String,
    /// Retry count of the work item at burial time
    pub failure_count: u32,
    pub can_reprocess: bool,
    pub reprocess_attempts: u32,
    pub last_reprocessed_at: Option<DateTime<Utc>>,
    pub last_reprocessed_by: Option<String>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(item: &WorkItem, reason: impl Into<String>) -> Self {
        Self {
            id: DeadLetterId::new(),
            work_item_id: item.id,
            session_id: item.session_id,
            task_type: item.task_type.clone(),
            failure_reason: reason.into(),
            failure_count: item.retries,
            can_reprocess: true,
            reprocess_attempts: 0,
            last_reprocessed_at: None,
            last_reprocessed_by: None,
            escalated_at: None,
            escalation_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated_at.is_some()
    }
}

/// Filter for dead letter queries; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeadLetterFilter {
    pub can_reprocess: Option<bool>,
    pub escalated: Option<bool>,
}

impl DeadLetterFilter {
    pub fn matches(&self, entry: &DeadLetterEntry) -> bool {
        if self.can_reprocess.is_some_and(|want| entry.can_reprocess != want) {
            return false;
        }
        if self.escalated.is_some_and(|want| entry.is_escalated() != want) {
            return false;
        }
        true
    }
}

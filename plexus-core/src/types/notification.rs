//! User-facing notifications emitted on coordination events.

use crate::id::{SessionId, WorkItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Critical,
}

/// A best-effort notification.
///
/// Delivery failures are logged and aggregated by the caller, never
/// propagated into the triggering operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub severity: NotificationSeverity,
    pub message: String,
    pub session_id: Option<SessionId>,
    pub work_item_id: Option<WorkItemId>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(severity: NotificationSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            session_id: None,
            work_item_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationSeverity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationSeverity::Warning, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(NotificationSeverity::Critical, message)
    }

    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn for_work_item(mut self, work_item_id: WorkItemId) -> Self {
        self.work_item_id = Some(work_item_id);
        self
    }
}

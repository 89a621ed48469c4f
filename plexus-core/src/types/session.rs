//! Orchestration sessions.

use crate::id::{AgentId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One user-initiated orchestration run.
///
/// The session ties together every work item, coordination entry, and
/// workflow spawned by a single user intent. Partial progress recorded
/// under a session survives its failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: String,
    /// The orchestrator-tier agent owning this session
    pub orchestrator: AgentId,
    pub status: SessionStatus,
    /// Accumulated context; always a JSON object
    pub context: Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, orchestrator: AgentId, context: Value) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            user_id: user_id.into(),
            orchestrator,
            status: SessionStatus::Active,
            context: normalize_object(context),
            error: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// Shallow-merge `patch` into the session context.
    ///
    /// Top-level keys from `patch` overwrite existing keys; nested objects
    /// are replaced wholesale, not merged.
    pub fn merge_context(&mut self, patch: &Value) {
        let Some(patch_map) = patch.as_object() else {
            return;
        };
        if !self.context.is_object() {
            self.context = Value::Object(serde_json::Map::new());
        }
        if let Some(context) = self.context.as_object_mut() {
            for (key, value) in patch_map {
                context.insert(key.clone(), value.clone());
            }
        }
    }
}

fn normalize_object(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        Value::Object(serde_json::Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_session_active() {
        let session = Session::new("user-42", AgentId::new("orchestrator-1"), json!({}));
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.error.is_none());
        assert!(session.context.is_object());
    }

    #[test]
    fn test_non_object_context_normalized() {
        let session = Session::new("user-42", AgentId::new("orchestrator-1"), json!("nope"));
        assert_eq!(session.context, json!({}));
    }

    #[test]
    fn test_shallow_merge_last_writer_wins() {
        let mut session = Session::new(
            "user-42",
            AgentId::new("orchestrator-1"),
            json!({"rfp": "2024-001", "stage": "scan", "nested": {"a": 1, "b": 2}}),
        );

        session.merge_context(&json!({"stage": "draft", "nested": {"a": 9}}));

        assert_eq!(session.context["rfp"], "2024-001");
        assert_eq!(session.context["stage"], "draft");
        // Nested objects are replaced, not deep-merged
        assert_eq!(session.context["nested"], json!({"a": 9}));
    }

    #[test]
    fn test_merge_ignores_non_object_patch() {
        let mut session = Session::new("u", AgentId::new("o"), json!({"k": 1}));
        session.merge_context(&json!([1, 2, 3]));
        assert_eq!(session.context, json!({"k": 1}));
    }
}

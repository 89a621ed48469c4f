//! Coordination log entries exchanged between agents.

use crate::id::{AgentId, EntryId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What kind of inter-agent interaction an entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationKind {
    Handoff,
    Collaboration,
    Consultation,
    Delegation,
    SpecialistRequest,
    Message,
}

impl fmt::Display for CoordinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handoff => write!(f, "handoff"),
            Self::Collaboration => write!(f, "collaboration"),
            Self::Consultation => write!(f, "consultation"),
            Self::Delegation => write!(f, "delegation"),
            Self::SpecialistRequest => write!(f, "specialist_request"),
            Self::Message => write!(f, "message"),
        }
    }
}

/// Terminality of a coordination entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStatus {
    Pending,
    Completed,
    Failed,
}

impl CoordinationStatus {
    /// Terminal entries are immutable
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for CoordinationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One audited interaction between two agents within a session.
///
/// Entries are written once, closed at most once (to a terminal status),
/// and never mutated afterwards. Per-session insertion order is preserved
/// for replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinationEntry {
    pub id: EntryId,
    pub session_id: SessionId,
    pub initiator: AgentId,
    pub target: AgentId,
    pub kind: CoordinationKind,
    /// Free-form context describing the interaction
    pub context: String,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub priority: i32,
    pub status: CoordinationStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CoordinationEntry {
    pub fn new(
        session_id: SessionId,
        initiator: AgentId,
        target: AgentId,
        kind: CoordinationKind,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            session_id,
            initiator,
            target,
            kind,
            context: context.into(),
            request: None,
            response: None,
            priority: 0,
            status: CoordinationStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_request(mut self, request: Value) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

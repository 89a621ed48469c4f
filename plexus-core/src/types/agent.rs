//! Agent entities and their lifecycle states.

use crate::id::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Hierarchy tier of an agent.
///
/// Orchestrators own sessions, managers own task groups, and specialists
/// execute individual work items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentTier {
    Orchestrator,
    Manager,
    Specialist,
}

impl fmt::Display for AgentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orchestrator => write!(f, "orchestrator"),
            Self::Manager => write!(f, "manager"),
            Self::Specialist => write!(f, "specialist"),
        }
    }
}

/// Operational status of an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A registered agent.
///
/// Agents become eligible for new work only while `status` is
/// [`AgentStatus::Active`], their heartbeat is within the configured
/// liveness window, and their current assignment count is below
/// `max_concurrency`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub agent_id: AgentId,
    pub tier: AgentTier,
    /// Capability tags; matching is set overlap, order and duplicates
    /// carry no meaning.
    pub capabilities: HashSet<String>,
    pub status: AgentStatus,
    /// Maximum number of work items this agent handles at once (>= 1).
    pub max_concurrency: usize,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new active agent with a fresh heartbeat
    pub fn new(
        agent_id: AgentId,
        tier: AgentTier,
        capabilities: impl IntoIterator<Item = String>,
        max_concurrency: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id,
            tier,
            capabilities: capabilities.into_iter().collect(),
            status: AgentStatus::Active,
            max_concurrency,
            last_heartbeat: now,
            registered_at: now,
        }
    }

    /// Whether this agent advertises at least one of the given capabilities
    pub fn has_any_capability<'a>(&self, wanted: impl IntoIterator<Item = &'a str>) -> bool {
        wanted.into_iter().any(|c| self.capabilities.contains(c))
    }

    /// Whether the last heartbeat is within `window` of `now`
    pub fn heartbeat_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.last_heartbeat < window
    }
}

/// Partial update applied to a registered agent.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub tier: Option<AgentTier>,
    pub capabilities: Option<HashSet<String>>,
    pub status: Option<AgentStatus>,
    pub max_concurrency: Option<usize>,
}

impl AgentUpdate {
    /// Apply this update to an agent in place
    pub fn apply(self, agent: &mut Agent) {
        if let Some(tier) = self.tier {
            agent.tier = tier;
        }
        if let Some(capabilities) = self.capabilities {
            agent.capabilities = capabilities;
        }
        if let Some(status) = self.status {
            agent.status = status;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            agent.max_concurrency = max_concurrency;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_agent() -> Agent {
        Agent::new(
            AgentId::new("scanner-1"),
            AgentTier::Specialist,
            ["scan".to_string(), "extract".to_string()],
            2,
        )
    }

    #[test]
    fn test_new_agent_is_active() {
        let agent = scan_agent();
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.max_concurrency, 2);
        assert_eq!(agent.last_heartbeat, agent.registered_at);
    }

    #[test]
    fn test_capability_overlap() {
        let agent = scan_agent();
        assert!(agent.has_any_capability(["scan"]));
        assert!(agent.has_any_capability(["summarize", "extract"]));
        assert!(!agent.has_any_capability(["summarize"]));
        assert!(!agent.has_any_capability([]));
    }

    #[test]
    fn test_heartbeat_window() {
        let agent = scan_agent();
        let now = Utc::now();
        assert!(agent.heartbeat_within(now, chrono::Duration::minutes(5)));
        let later = now + chrono::Duration::minutes(10);
        assert!(!agent.heartbeat_within(later, chrono::Duration::minutes(5)));
    }

    #[test]
    fn test_partial_update() {
        let mut agent = scan_agent();
        let registered_at = agent.registered_at;

        AgentUpdate {
            status: Some(AgentStatus::Inactive),
            max_concurrency: Some(4),
            ..Default::default()
        }
        .apply(&mut agent);

        assert_eq!(agent.status, AgentStatus::Inactive);
        assert_eq!(agent.max_concurrency, 4);
        // Untouched fields survive
        assert_eq!(agent.tier, AgentTier::Specialist);
        assert_eq!(agent.registered_at, registered_at);
    }

    #[test]
    fn test_capabilities_deduplicate() {
        let agent = Agent::new(
            AgentId::new("dup"),
            AgentTier::Specialist,
            ["scan".to_string(), "scan".to_string()],
            1,
        );
        assert_eq!(agent.capabilities.len(), 1);
    }
}

//! Agent registry: who exists, what they can do, and who has capacity.
//!
//! Registration is an idempotent upsert keyed by agent id: re-registering
//! refreshes the heartbeat and overwrites the mutable fields while keeping
//! the original registration timestamp. Availability combines status,
//! heartbeat age, capability overlap, and current load.

use chrono::Utc;
use plexus_core::config::RegistryConfig;
use plexus_core::error::PlexusError;
use plexus_core::id::AgentId;
use plexus_core::traits::Storage;
use plexus_core::types::{Agent, AgentStatus, AgentTier, AgentUpdate};
use plexus_core::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry-wide snapshot of agent counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub active: usize,
    pub inactive: usize,
    pub error: usize,
    pub orchestrators: usize,
    pub managers: usize,
    pub specialists: usize,
}

pub struct AgentRegistry {
    storage: Arc<dyn Storage>,
    config: RegistryConfig,
}

impl AgentRegistry {
    pub fn new(storage: Arc<dyn Storage>, config: RegistryConfig) -> Self {
        Self { storage, config }
    }

    /// Register an agent, or refresh it if the id is already known.
    ///
    /// Re-registration overwrites tier, capabilities, and concurrency,
    /// resets status to `Active`, and refreshes the heartbeat; the original
    /// `registered_at` is preserved.
    pub async fn register(
        &self,
        agent_id: AgentId,
        tier: AgentTier,
        capabilities: impl IntoIterator<Item = String> + Send,
        max_concurrency: usize,
    ) -> Result<Agent> {
        let capabilities: HashSet<String> = capabilities.into_iter().collect();
        if capabilities.is_empty() {
            return Err(PlexusError::invalid_input(
                "agent must advertise at least one capability",
            ));
        }
        if max_concurrency == 0 {
            return Err(PlexusError::invalid_input("max_concurrency must be >= 1"));
        }

        let agent = match self.storage.get_agent(&agent_id).await? {
            Some(mut existing) => {
                existing.tier = tier;
                existing.capabilities = capabilities;
                existing.max_concurrency = max_concurrency;
                existing.status = AgentStatus::Active;
                existing.last_heartbeat = Utc::now();
                info!("Re-registered agent '{}' ({})", existing.agent_id, tier);
                existing
            }
            None => {
                let agent = Agent::new(agent_id, tier, capabilities, max_concurrency);
                info!(
                    "Registered agent '{}' ({}, {} capabilities)",
                    agent.agent_id,
                    tier,
                    agent.capabilities.len()
                );
                agent
            }
        };
        self.storage.put_agent(&agent).await?;
        Ok(agent)
    }

    /// Apply a partial update to a registered agent
    pub async fn update(&self, id: &AgentId, update: AgentUpdate) -> Result<Agent> {
        if update
            .capabilities
            .as_ref()
            .is_some_and(|caps| caps.is_empty())
        {
            return Err(PlexusError::invalid_input(
                "agent must advertise at least one capability",
            ));
        }
        if update.max_concurrency == Some(0) {
            return Err(PlexusError::invalid_input("max_concurrency must be >= 1"));
        }

        let mut agent = self.require(id).await?;
        update.apply(&mut agent);
        self.storage.put_agent(&agent).await?;
        debug!("Updated agent '{}'", agent.agent_id);
        Ok(agent)
    }

    /// Remove an agent; returns whether it was registered
    pub async fn deregister(&self, id: &AgentId) -> Result<bool> {
        let existed = self.storage.delete_agent(id).await?;
        if existed {
            info!("Deregistered agent '{}'", id);
        }
        Ok(existed)
    }

    pub async fn get(&self, id: &AgentId) -> Result<Agent> {
        self.require(id).await
    }

    pub async fn list(&self) -> Result<Vec<Agent>> {
        self.storage.list_agents().await
    }

    pub async fn by_tier(&self, tier: AgentTier) -> Result<Vec<Agent>> {
        self.storage.agents_by_tier(tier).await
    }

    /// Agents whose capability set overlaps the given tags (any status)
    pub async fn by_capability(&self, capabilities: &[String]) -> Result<Vec<Agent>> {
        self.storage.agents_by_capability(capabilities).await
    }

    pub async fn active(&self) -> Result<Vec<Agent>> {
        self.storage.agents_by_status(AgentStatus::Active).await
    }

    /// Refresh an agent's liveness timestamp.
    ///
    /// Heartbeats never change status; recovery from `Inactive` or `Error`
    /// goes through [`set_status`](Self::set_status) or re-registration.
    pub async fn heartbeat(&self, id: &AgentId) -> Result<()> {
        let mut agent = self.require(id).await?;
        agent.last_heartbeat = Utc::now();
        self.storage.put_agent(&agent).await?;
        debug!("Heartbeat from agent '{}'", id);
        Ok(())
    }

    pub async fn set_status(&self, id: &AgentId, status: AgentStatus) -> Result<Agent> {
        let mut agent = self.require(id).await?;
        if agent.status != status {
            info!("Agent '{}' status {} -> {}", id, agent.status, status);
        }
        agent.status = status;
        self.storage.put_agent(&agent).await?;
        Ok(agent)
    }

    /// Find agents able to take on new work requiring any of `capabilities`.
    ///
    /// Keeps agents that are `Active`, heartbeat-fresh, capability-matched,
    /// optionally tier-matched, and below their concurrency limit. Results
    /// are ordered oldest heartbeat first as a load-spreading heuristic.
    /// An empty result means "no capacity right now", not an error.
    pub async fn find_available(
        &self,
        capabilities: &[String],
        tier: Option<AgentTier>,
    ) -> Result<Vec<Agent>> {
        if capabilities.is_empty() {
            return Err(PlexusError::invalid_input(
                "find_available requires at least one capability",
            ));
        }

        let now = Utc::now();
        let window = chrono::Duration::seconds(self.config.heartbeat_window_secs as i64);
        let candidates = self.storage.agents_by_capability(capabilities).await?;

        let mut available = Vec::new();
        for agent in candidates {
            if agent.status != AgentStatus::Active {
                continue;
            }
            if !agent.heartbeat_within(now, window) {
                continue;
            }
            if tier.is_some_and(|t| agent.tier != t) {
                continue;
            }
            let load = self.storage.count_active_for_agent(&agent.agent_id).await?;
            if load >= agent.max_concurrency {
                debug!(
                    "Agent '{}' saturated ({}/{})",
                    agent.agent_id, load, agent.max_concurrency
                );
                continue;
            }
            available.push(agent);
        }

        available.sort_by_key(|a| a.last_heartbeat);
        Ok(available)
    }

    /// Current number of items assigned to or in progress for an agent
    pub async fn current_load(&self, id: &AgentId) -> Result<usize> {
        self.storage.count_active_for_agent(id).await
    }

    pub async fn stats(&self) -> Result<RegistryStats> {
        let agents = self.storage.list_agents().await?;
        let mut stats = RegistryStats {
            total_agents: agents.len(),
            ..Default::default()
        };
        for agent in &agents {
            match agent.status {
                AgentStatus::Active => stats.active += 1,
                AgentStatus::Inactive => stats.inactive += 1,
                AgentStatus::Error => stats.error += 1,
            }
            match agent.tier {
                AgentTier::Orchestrator => stats.orchestrators += 1,
                AgentTier::Manager => stats.managers += 1,
                AgentTier::Specialist => stats.specialists += 1,
            }
        }
        Ok(stats)
    }

    async fn require(&self, id: &AgentId) -> Result<Agent> {
        self.storage
            .get_agent(id)
            .await?
            .ok_or_else(|| PlexusError::not_found("agent", id.as_str()))
    }
}

//! Session lifecycle: one session per user-initiated orchestration run.

use chrono::Utc;
use plexus_core::error::PlexusError;
use plexus_core::id::{AgentId, SessionId};
use plexus_core::traits::Storage;
use plexus_core::types::{AgentTier, Session, SessionStatus};
use plexus_core::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SessionManager {
    storage: Arc<dyn Storage>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Open a session owned by a registered orchestrator-tier agent
    pub async fn create(
        &self,
        user_id: impl Into<String>,
        orchestrator: &AgentId,
        context: Value,
    ) -> Result<Session> {
        let owner = self
            .storage
            .get_agent(orchestrator)
            .await?
            .ok_or_else(|| PlexusError::not_found("agent", orchestrator.as_str()))?;
        if owner.tier != AgentTier::Orchestrator {
            return Err(PlexusError::invalid_input(format!(
                "agent '{}' is {} tier, sessions require an orchestrator",
                orchestrator, owner.tier
            )));
        }

        let session = Session::new(user_id, orchestrator.clone(), context);
        self.storage.put_session(&session).await?;
        info!(
            "Created session {} for user '{}' (orchestrator '{}')",
            session.session_id, session.user_id, orchestrator
        );
        Ok(session)
    }

    pub async fn get(&self, id: SessionId) -> Result<Session> {
        self.require(id).await
    }

    /// Shallow-merge a patch into the session context (later keys win).
    /// Terminal sessions reject merges.
    pub async fn merge_context(&self, id: SessionId, patch: &Value) -> Result<Session> {
        let mut session = self.require(id).await?;
        if session.status.is_terminal() {
            return Err(PlexusError::invalid_transition(
                "session",
                session.status,
                session.status,
            ));
        }
        session.merge_context(patch);
        session.last_activity = Utc::now();
        self.storage.put_session(&session).await?;
        debug!("Merged context into session {}", id);
        Ok(session)
    }

    /// Bump `last_activity`; called on every work-item event.
    /// A terminal session ignores the touch (trailing events are normal).
    pub async fn touch(&self, id: SessionId) -> Result<()> {
        let mut session = self.require(id).await?;
        if session.status.is_terminal() {
            debug!("Ignoring touch on terminal session {}", id);
            return Ok(());
        }
        session.last_activity = Utc::now();
        self.storage.put_session(&session).await
    }

    pub async fn complete(&self, id: SessionId) -> Result<Session> {
        self.finish(id, SessionStatus::Completed, None).await
    }

    /// Mark the session failed, keeping all partial progress recorded so far
    pub async fn fail(&self, id: SessionId, error: impl Into<String>) -> Result<Session> {
        self.finish(id, SessionStatus::Failed, Some(error.into()))
            .await
    }

    async fn finish(
        &self,
        id: SessionId,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<Session> {
        let mut session = self.require(id).await?;
        if session.status.is_terminal() {
            return Err(PlexusError::invalid_transition(
                "session",
                session.status,
                status,
            ));
        }
        session.status = status;
        session.error = error;
        session.last_activity = Utc::now();
        self.storage.put_session(&session).await?;
        info!("Session {} ended as {}", id, status);
        Ok(session)
    }

    async fn require(&self, id: SessionId) -> Result<Session> {
        self.storage
            .get_session(id)
            .await?
            .ok_or_else(|| PlexusError::not_found("session", id))
    }
}

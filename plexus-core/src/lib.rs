//! Core types and abstractions for the Plexus coordination system.
//!
//! This crate provides the foundational types, traits, and error handling
//! used across all Plexus components: agent and work-item entities, the
//! storage and task-execution seams, and the configuration model.

pub mod config;
pub mod error;
pub mod id;
pub mod traits;
pub mod types;

pub use config::PlexusConfig;
pub use error::{PlexusError, Result, TaskError, TaskErrorKind};
pub use id::{AgentId, DeadLetterId, EntryId, SessionId, WorkItemId, WorkflowId};
pub use traits::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::PlexusConfig;
    pub use crate::error::{PlexusError, Result, TaskError, TaskErrorKind};
    pub use crate::id::{AgentId, DeadLetterId, EntryId, SessionId, WorkItemId, WorkflowId};
    pub use crate::traits::*;
    pub use crate::types::*;
}

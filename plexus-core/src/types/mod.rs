//! Type definitions for the Plexus system.
//!
//! This module provides the entity model shared across all Plexus
//! components: agents, work items, coordination entries, sessions,
//! workflow state, dead letters, and notifications.

pub mod agent;
pub mod coordination;
pub mod dead_letter;
pub mod notification;
pub mod session;
pub mod work_item;
pub mod workflow;

pub use agent::{Agent, AgentStatus, AgentTier, AgentUpdate};
pub use coordination::{CoordinationEntry, CoordinationKind, CoordinationStatus};
pub use dead_letter::{DeadLetterEntry, DeadLetterFilter};
pub use notification::{Notification, NotificationSeverity};
pub use session::{Session, SessionStatus};
pub use work_item::{NewWorkItem, TaskStatusReport, WorkItem, WorkItemStatus};
pub use workflow::{
    CreatedWorkflow, PhaseSpec, PhaseTransition, WorkflowSpec, WorkflowState, WorkflowStatus,
};

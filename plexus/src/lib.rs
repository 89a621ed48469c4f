//! Plexus - Multi-Tier Agent Work Coordination Engine
//!
//! Plexus distributes work items across a fleet of orchestrator, manager,
//! and specialist agents: capability-matched assignment, atomic claims,
//! bounded retries with a dead letter queue behind them, session and
//! workflow state, and the resilience primitives (retry executor, circuit
//! breaker) protecting the external task executor.
//!
//! # Architecture
//!
//! - `resilience` - retry executor and circuit breaker primitives
//! - `registry` - agent registration, heartbeats, capability lookup
//! - `queue` - the work item queue with priority/deadline ordering
//! - `dlq` - dead letter queue for items that exhausted their retries
//! - `coordination` - inter-agent delegation, requests, and messaging
//! - `session` - session lifecycle and context state
//! - `workflow` - multi-phase workflow state with suspend/resume
//! - `worker` - per-agent polling consumers
//! - `coordinator` - the composition root wiring everything together

// Resilience primitives
pub mod resilience;

// Agent registry and lifecycle
pub mod registry;

// Work distribution
pub mod dlq;
pub mod queue;

// Inter-agent coordination and logical state
pub mod coordination;
pub mod session;
pub mod workflow;

// Worker runtime and composition root
pub mod coordinator;
pub mod worker;

// Re-export the engine surface
pub use coordination::{CoordinationLog, Delegation};
pub use coordinator::Coordinator;
pub use dlq::DeadLetterQueue;
pub use queue::WorkQueue;
pub use registry::{AgentRegistry, RegistryStats};
pub use resilience::{
    retry, retry_all, retry_with_hook, BreakerRegistry, BreakerStats, CircuitBreaker,
    CircuitState, RetryClassifier, RetryPolicy,
};
pub use session::SessionManager;
pub use worker::{AgentWorker, WorkerPool};
pub use workflow::WorkflowEngine;

// Core vocabulary, so embedders need a single dependency
pub use plexus_core::prelude;
pub use plexus_core::{PlexusConfig, PlexusError, Result, TaskError, TaskErrorKind};

/// Plexus version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

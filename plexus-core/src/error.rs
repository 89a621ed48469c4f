//! Error types for the Plexus system.

use std::fmt;

/// Result type alias for Plexus operations.
pub type Result<T> = std::result::Result<T, PlexusError>;

/// Main error type for the Plexus system.
#[derive(Debug, thiserror::Error)]
pub enum PlexusError {
    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Illegal lifecycle transition for an entity
    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// Lost conditional update (e.g. a work item claim race)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Circuit breaker rejected the call without invoking it
    #[error("Circuit breaker open for service '{service}'")]
    CircuitOpen { service: String },

    /// Retry budget exhausted; carries the final task error
    #[error("Retry budget exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: TaskError,
    },

    /// Task execution failure surfaced without further wrapping
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlexusError {
    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid transition error
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new circuit-open error
    pub fn circuit_open(service: impl Into<String>) -> Self {
        Self::CircuitOpen {
            service: service.into(),
        }
    }

    /// Create a new retry-exhausted error
    pub fn retry_exhausted(attempts: u32, source: TaskError) -> Self {
        Self::RetryExhausted { attempts, source }
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this is a circuit-open rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this is a retry exhaustion
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Check if this is an invalid transition error
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

// ============================================================================
// Task execution errors
// ============================================================================

/// Classification of a task execution failure.
///
/// The retry presets key off these kinds to decide whether a failure is
/// transient (worth retrying) or fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    /// The operation exceeded its time budget
    Timeout,
    /// Transport-level connection reset
    ConnectionReset,
    /// HTTP failure with a status code
    Http { status: u16 },
    /// Upstream rate limiting (HTTP 429 or equivalent)
    RateLimited,
    /// Database refused the connection
    DbConnectionRefused,
    /// Database deadlock detected
    DbDeadlock,
    /// Database connection pool exhausted
    DbPoolExhausted,
    /// Execution was cancelled mid-flight
    Cancelled,
    /// Permanent failure; retrying cannot help
    Fatal,
    /// Unclassified failure
    Other,
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectionReset => write!(f, "connection_reset"),
            Self::Http { status } => write!(f, "http_{status}"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::DbConnectionRefused => write!(f, "db_connection_refused"),
            Self::DbDeadlock => write!(f, "db_deadlock"),
            Self::DbPoolExhausted => write!(f, "db_pool_exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Fatal => write!(f, "fatal"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Error returned by a [`TaskExecutor`](crate::traits::TaskExecutor).
///
/// Carries a [`TaskErrorKind`] so retry policies can classify the failure
/// without parsing message strings.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Task failed ({kind}): {message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    /// Create a task error with an explicit kind
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Timeout, message)
    }

    /// Create a connection reset error
    pub fn connection_reset(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::ConnectionReset, message)
    }

    /// Create an HTTP error with a status code
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Http { status }, message)
    }

    /// Create a rate-limited error
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::RateLimited, message)
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Cancelled, message)
    }

    /// Create a fatal (non-retryable) error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Fatal, message)
    }

    /// Whether this failure is a transient transport fault.
    ///
    /// Covers connection resets, timeouts, rate limiting, and the HTTP
    /// statuses worth retrying: 408, 429, and all 5xx.
    pub fn is_transient_transport(&self) -> bool {
        match self.kind {
            TaskErrorKind::ConnectionReset
            | TaskErrorKind::Timeout
            | TaskErrorKind::RateLimited => true,
            TaskErrorKind::Http { status } => {
                status == 408 || status == 429 || (500..600).contains(&status)
            }
            _ => false,
        }
    }

    /// Whether this failure is a transient database fault
    pub fn is_transient_database(&self) -> bool {
        matches!(
            self.kind,
            TaskErrorKind::DbConnectionRefused
                | TaskErrorKind::DbDeadlock
                | TaskErrorKind::DbPoolExhausted
                | TaskErrorKind::Timeout
        )
    }

    /// Whether retrying can never succeed
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, TaskErrorKind::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors() {
        let err = PlexusError::not_found("work_item", "abc-123");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: work_item with id abc-123");

        let err = PlexusError::circuit_open("llm");
        assert!(err.is_circuit_open());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = PlexusError::invalid_transition("work_item", "completed", "pending");
        assert_eq!(
            err.to_string(),
            "Invalid transition for work_item: completed -> pending"
        );
    }

    #[test]
    fn test_retry_exhausted_carries_source() {
        let err = PlexusError::retry_exhausted(3, TaskError::timeout("llm call"));
        assert!(err.is_retry_exhausted());
        let rendered = err.to_string();
        assert!(rendered.contains("3 attempts"));
    }

    #[test]
    fn test_transient_transport_classification() {
        assert!(TaskError::connection_reset("reset").is_transient_transport());
        assert!(TaskError::http(503, "unavailable").is_transient_transport());
        assert!(TaskError::http(429, "slow down").is_transient_transport());
        assert!(TaskError::http(408, "timeout").is_transient_transport());
        assert!(!TaskError::http(400, "bad request").is_transient_transport());
        assert!(!TaskError::fatal("bad payload").is_transient_transport());
    }

    #[test]
    fn test_transient_database_classification() {
        let deadlock = TaskError::new(TaskErrorKind::DbDeadlock, "deadlock");
        assert!(deadlock.is_transient_database());
        assert!(!deadlock.is_transient_transport());
        assert!(TaskError::timeout("query").is_transient_database());
        assert!(!TaskError::fatal("constraint").is_transient_database());
    }
}

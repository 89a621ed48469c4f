//! Failure-handling primitives: retry with backoff and circuit breaking.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerRegistry, BreakerStats, CircuitBreaker, CircuitState};
pub use retry::{retry, retry_all, retry_with_hook, RetryClassifier, RetryPolicy};

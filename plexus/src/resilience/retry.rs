//! Retry executor with exponential backoff.
//!
//! Wraps a fallible async operation and re-runs it until it succeeds,
//! the attempt budget is spent, or the classifier declines the error.
//! Delays grow geometrically from `initial_delay` by `multiplier`,
//! capped at `max_delay`, with optional uniform jitter on top.

use plexus_core::config::RetryConfig;
use plexus_core::error::TaskError;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Classifier
// ============================================================================

/// Decides whether a failed attempt is worth retrying.
#[derive(Clone, Default)]
pub enum RetryClassifier {
    /// Retry every failure until attempts run out
    #[default]
    Always,
    /// Retry transient transport faults: timeouts, resets, rate limits,
    /// HTTP 408/429/5xx
    Transport,
    /// Retry transient database faults: refused connections, deadlocks,
    /// exhausted pools, timeouts
    Database,
    /// Custom predicate over the error and the 1-based attempt number
    Custom(Arc<dyn Fn(&TaskError, u32) -> bool + Send + Sync>),
}

impl RetryClassifier {
    pub fn should_retry(&self, error: &TaskError, attempt: u32) -> bool {
        match self {
            Self::Always => true,
            Self::Transport => error.is_transient_transport(),
            Self::Database => error.is_transient_database(),
            Self::Custom(pred) => pred(error, attempt),
        }
    }
}

impl fmt::Debug for RetryClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Transport => write!(f, "Transport"),
            Self::Database => write!(f, "Database"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Backoff schedule and retry budget for one class of operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
    /// Exponential growth factor (>= 1.0)
    pub multiplier: f64,
    /// Add uniform(0, delay/2) on top of each computed delay
    pub jitter: bool,
    /// Which errors are worth another attempt
    pub classifier: RetryClassifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
            jitter: config.jitter,
            classifier: RetryClassifier::Always,
        }
    }

    /// Preset for HTTP-backed tasks: retries only transient transport
    /// faults (408/429/5xx, timeouts, resets).
    pub fn http() -> Self {
        Self {
            classifier: RetryClassifier::Transport,
            ..Default::default()
        }
    }

    /// Preset for database-backed tasks: tight initial delay, gentle
    /// growth, retries only transient database faults.
    pub fn database() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            multiplier: 1.5,
            jitter: true,
            classifier: RetryClassifier::Database,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn with_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Unjittered delay scheduled after the given 1-based attempt fails.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Delay actually slept after the given attempt, jitter included.
    fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for(attempt);
        if !self.jitter {
            return base;
        }
        let spread = base.as_secs_f64() * 0.5;
        let extra = rand::rng().random_range(0.0..=spread);
        base + Duration::from_secs_f64(extra)
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Run `operation` under the policy, returning the first success or the
/// last error once the budget is spent or the classifier declines.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    retry_with_hook(policy, operation, |_, _, _| {}).await
}

/// Like [`retry`], invoking `on_retry(error, attempt, delay)` before each
/// backoff sleep.
pub async fn retry_with_hook<T, F, Fut, H>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: H,
) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
    H: FnMut(&TaskError, u32, Duration),
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e)
                if attempt < policy.max_attempts
                    && policy.classifier.should_retry(&e, attempt) =>
            {
                let delay = policy.next_delay(attempt);
                warn!(
                    "Attempt {}/{} failed, retrying in {:?}: {}",
                    attempt, policy.max_attempts, delay, e
                );
                on_retry(&e, attempt, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retry each operation independently and concurrently, preserving input
/// order in the output. One failure never cancels the others.
pub async fn retry_all<T, F, Fut>(
    policy: &RetryPolicy,
    operations: Vec<F>,
) -> Vec<Result<T, TaskError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let runs = operations.into_iter().map(|op| retry(policy, op));
    futures::future::join_all(runs).await
}

//! Circuit breaker for protected service calls.
//!
//! A breaker trips open after `failure_threshold` recorded failures and
//! rejects calls outright until `open_timeout` has passed. It then admits
//! a single trial call at a time (half-open); `success_threshold` trial
//! successes close it again, one trial failure reopens it. A closed
//! breaker forgets stale failures after a `reset_timeout` quiet period.
//!
//! [`BreakerRegistry`] keys breakers by service name, creating them
//! lazily and pruning closed breakers nobody has touched in a while.

use dashmap::DashMap;
use parking_lot::RwLock;
use plexus_core::config::BreakerConfig;
use plexus_core::error::{PlexusError, TaskError};
use plexus_core::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Failures recorded since the last quiet-period reset or close
    failures: u32,
    /// Successful trials since entering half-open
    half_open_successes: u32,
    /// A half-open trial has been admitted and not yet recorded
    trial_in_flight: bool,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    last_used: Instant,
}

impl BreakerInner {
    fn fresh() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            half_open_successes: 0,
            trial_in_flight: false,
            last_failure: None,
            opened_at: None,
            last_used: Instant::now(),
        }
    }
}

/// Point-in-time breaker snapshot for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

// ============================================================================
// Breaker
// ============================================================================

pub struct CircuitBreaker {
    service: String,
    config: BreakerConfig,
    inner: RwLock<BreakerInner>,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            service: service.into(),
            config: config.clone(),
            inner: RwLock::new(BreakerInner::fresh()),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Whether a call may go ahead right now.
    ///
    /// Every granted call must be matched by [`record_success`] or
    /// [`record_failure`]; a granted half-open trial blocks further
    /// trials until its outcome is recorded.
    ///
    /// [`record_success`]: Self::record_success
    /// [`record_failure`]: Self::record_failure
    pub fn can_proceed(&self) -> bool {
        let mut inner = self.inner.write();
        inner.last_used = Instant::now();
        match inner.state {
            CircuitState::Closed => {
                // Quiet period: old failures no longer count
                if inner.failures > 0 {
                    let quiet = inner
                        .last_failure
                        .is_some_and(|at| at.elapsed() >= self.config.reset_timeout());
                    if quiet {
                        debug!(
                            "Circuit breaker '{}' forgetting {} stale failures",
                            self.service, inner.failures
                        );
                        inner.failures = 0;
                        inner.last_failure = None;
                    }
                }
                true
            }
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.open_timeout());
                if expired {
                    info!(
                        "Circuit breaker '{}' transitioning to half-open",
                        self.service
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.trial_in_flight = true;
                    true
                } else {
                    self.total_rejections.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    self.total_rejections.fetch_add(1, Ordering::Relaxed);
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.write();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                info!("Circuit breaker '{}' closed after recovery", self.service);
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                inner.half_open_successes = 0;
                inner.last_failure = None;
                inner.opened_at = None;
            }
        }
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.write();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker '{}' opened after {} failures",
                        self.service, inner.failures
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit breaker '{}' reopened by failed trial",
                    self.service
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Run `operation` under the breaker, recording the outcome.
    ///
    /// Returns [`PlexusError::CircuitOpen`] without invoking the operation
    /// when the breaker rejects the call.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, TaskError>>,
    {
        if !self.can_proceed() {
            return Err(PlexusError::circuit_open(&self.service));
        }
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e.into())
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Time since the breaker last gated a call
    pub fn idle_for(&self) -> Duration {
        self.inner.read().last_used.elapsed()
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.read();
        BreakerStats {
            service: self.service.clone(),
            state: inner.state,
            consecutive_failures: inner.failures,
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Manually restore the breaker to a fresh closed state
    pub fn reset(&self) {
        info!("Circuit breaker '{}' manually reset", self.service);
        *self.inner.write() = BreakerInner::fresh();
    }

    /// Manually trip the breaker open
    pub fn force_open(&self) {
        warn!("Circuit breaker '{}' forced open", self.service);
        let mut inner = self.inner.write();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Lazily-created circuit breakers keyed by service name, all sharing
/// one configuration.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Fetch the breaker for a service, creating it on first use
    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                debug!("Creating circuit breaker for service '{}'", service);
                Arc::new(CircuitBreaker::new(service, &self.config))
            })
            .clone()
    }

    /// Drop closed breakers idle longer than the configured prune age.
    /// Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let prune_age = self.config.prune_idle();
        let before = self.breakers.len();
        self.breakers.retain(|_, breaker| {
            breaker.state() != CircuitState::Closed || breaker.idle_for() <= prune_age
        });
        let removed = before - self.breakers.len();
        if removed > 0 {
            debug!("Pruned {} idle circuit breakers", removed);
        }
        removed
    }

    /// Run [`prune_idle`](Self::prune_idle) on an interval until the
    /// token is cancelled.
    pub fn spawn_pruner(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Circuit breaker pruner stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.prune_idle();
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut all: Vec<_> = self.breakers.iter().map(|e| e.value().stats()).collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            open_timeout_ms: 50,
            success_threshold: 2,
            reset_timeout_ms: 80,
            prune_idle_secs: 0,
        }
    }

    #[test]
    fn test_trips_open_at_threshold() {
        let cb = CircuitBreaker::new("api", &test_config());
        assert!(cb.can_proceed());

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_proceed());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_proceed());
    }

    #[tokio::test]
    async fn test_half_open_single_trial_then_close() {
        let cb = CircuitBreaker::new("api", &test_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(!cb.can_proceed());

        tokio::time::sleep(Duration::from_millis(60)).await;

        // First caller gets the trial, a concurrent one is rejected
        assert!(cb.can_proceed());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.can_proceed());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Second trial closes it
        assert!(cb.can_proceed());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("api", &test_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.can_proceed());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_proceed());
    }

    #[tokio::test]
    async fn test_quiet_period_forgets_failures() {
        let cb = CircuitBreaker::new("api", &test_config());
        cb.record_failure();
        cb.record_failure();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cb.can_proceed());

        // Old failures were forgotten, so two more do not trip it
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_execute_rejects_when_open() {
        let cb = CircuitBreaker::new("api", &test_config());
        cb.force_open();

        let result = cb.execute(|| async { Ok::<_, TaskError>(42) }).await;
        let err = result.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(cb.stats().total_rejections, 1);
    }

    #[tokio::test]
    async fn test_execute_records_outcomes() {
        let cb = CircuitBreaker::new("api", &test_config());

        let ok = cb.execute(|| async { Ok::<_, TaskError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = cb
            .execute(|| async { Err::<(), _>(TaskError::timeout("slow")) })
            .await;
        assert!(err.is_err());

        let stats = cb.stats();
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.consecutive_failures, 1);
    }

    #[test]
    fn test_reset_restores_closed() {
        let cb = CircuitBreaker::new("api", &test_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.is_open());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_proceed());
    }

    #[test]
    fn test_registry_reuses_instances() {
        let registry = BreakerRegistry::new(test_config());
        let a = registry.get("search");
        let b = registry.get("search");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.get("index");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_registry_prunes_idle_closed_only() {
        let registry = BreakerRegistry::new(test_config());
        registry.get("idle-closed");
        registry.get("stuck-open").force_open();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = registry.prune_idle();
        assert_eq!(removed, 1);

        let stats = registry.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].service, "stuck-open");
    }

    #[tokio::test]
    async fn test_pruner_task_stops_on_cancel() {
        let registry = Arc::new(BreakerRegistry::new(test_config()));
        let shutdown = CancellationToken::new();
        let handle = registry.spawn_pruner(Duration::from_millis(10), shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();
    }
}

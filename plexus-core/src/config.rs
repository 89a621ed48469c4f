//! Configuration for the Plexus coordination engine.
//!
//! Plexus is a library, so configuration is plain data handed to the
//! engine at construction time: load it from a TOML file, apply
//! `PLEXUS_*` environment overrides, validate, and pass it along. Saving
//! is atomic (write to a temp file, then rename).

use crate::error::{PlexusError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// The current configuration version
pub const CONFIG_VERSION: &str = "0.1.0";

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "PLEXUS_CONFIG_PATH";
pub const ENV_LOG_LEVEL: &str = "PLEXUS_LOG_LEVEL";
pub const ENV_MAX_RETRIES: &str = "PLEXUS_MAX_RETRIES";
pub const ENV_HEARTBEAT_WINDOW_SECS: &str = "PLEXUS_HEARTBEAT_WINDOW_SECS";
pub const ENV_POLL_INTERVAL_MS: &str = "PLEXUS_POLL_INTERVAL_MS";
pub const ENV_BREAKER_FAILURE_THRESHOLD: &str = "PLEXUS_BREAKER_FAILURE_THRESHOLD";

/// Root configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PlexusConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Configuration version for migration support
    pub version: String,
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Defaults for the retry executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any computed delay, in milliseconds
    pub max_delay_ms: u64,
    /// Exponential growth factor (>= 1.0)
    pub multiplier: f64,
    /// Add uniform(0, delay/2) on top of each computed delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Defaults for circuit breakers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed breaker
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls, in milliseconds
    pub open_timeout_ms: u64,
    /// Half-open successes required to close
    pub success_threshold: u32,
    /// Quiet period after which a closed breaker forgets old failures,
    /// in milliseconds
    pub reset_timeout_ms: u64,
    /// Idle age at which the breaker registry prunes closed breakers,
    /// in seconds
    pub prune_idle_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 30_000,
            success_threshold: 2,
            reset_timeout_ms: 60_000,
            prune_idle_secs: 3600,
        }
    }
}

impl BreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn prune_idle(&self) -> Duration {
        Duration::from_secs(self.prune_idle_secs)
    }
}

/// Work queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Retry budget per work item before it is buried in the DLQ
    pub max_retries: u32,
    /// Cadence of the sweep that requeues due failed items, in milliseconds
    pub requeue_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            requeue_interval_ms: 5_000,
        }
    }
}

impl QueueConfig {
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_millis(self.requeue_interval_ms)
    }
}

/// Agent registry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Heartbeat age beyond which an agent is ineligible for work, in seconds
    pub heartbeat_window_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_window_secs: 300,
        }
    }
}

impl RegistryConfig {
    pub fn heartbeat_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_window_secs as i64)
    }
}

/// Agent worker runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Sleep between polling cycles, in milliseconds
    pub poll_interval_ms: u64,
    /// Per-execution time budget, in seconds
    pub task_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            task_timeout_secs: 300,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

impl PlexusConfig {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PlexusError::Config(format!("Failed to read config file: {e}")))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| PlexusError::Config(format!("Failed to parse config file: {e}")))?;

        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    /// with environment overrides applied
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path).await
        } else {
            debug!(
                "No config file at {}, using defaults",
                path.display()
            );
            let mut config = Self::default();
            config.merge_env_vars()?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Save configuration to a file atomically (temp file + rename)
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PlexusError::Config(format!("Failed to create config directory: {e}"))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PlexusError::Config(format!("Failed to serialize config: {e}")))?;

        let temp_path = path.with_extension("toml.tmp");

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| PlexusError::Config(format!("Failed to write config file: {e}")))?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| PlexusError::Config(format!("Failed to rename config file: {e}")))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlexusError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(PlexusError::Config(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.multiplier < 1.0 {
            return Err(PlexusError::Config(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(PlexusError::Config(
                "retry.initial_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            ));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(PlexusError::Config(
                "breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.breaker.success_threshold == 0 {
            return Err(PlexusError::Config(
                "breaker.success_threshold must be greater than 0".to_string(),
            ));
        }

        if self.registry.heartbeat_window_secs == 0 {
            return Err(PlexusError::Config(
                "registry.heartbeat_window_secs must be greater than 0".to_string(),
            ));
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(PlexusError::Config(
                "worker.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Merge environment variable overrides into the configuration
    pub fn merge_env_vars(&mut self) -> Result<()> {
        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }

        if let Ok(max_retries) = std::env::var(ENV_MAX_RETRIES) {
            let parsed = max_retries.parse::<u32>().map_err(|e| {
                PlexusError::Config(format!("Invalid {ENV_MAX_RETRIES} in environment: {e}"))
            })?;
            debug!("Overriding queue.max_retries from environment: {}", parsed);
            self.queue.max_retries = parsed;
        }

        if let Ok(window) = std::env::var(ENV_HEARTBEAT_WINDOW_SECS) {
            let parsed = window.parse::<u64>().map_err(|e| {
                PlexusError::Config(format!(
                    "Invalid {ENV_HEARTBEAT_WINDOW_SECS} in environment: {e}"
                ))
            })?;
            debug!(
                "Overriding registry.heartbeat_window_secs from environment: {}",
                parsed
            );
            self.registry.heartbeat_window_secs = parsed;
        }

        if let Ok(interval) = std::env::var(ENV_POLL_INTERVAL_MS) {
            let parsed = interval.parse::<u64>().map_err(|e| {
                PlexusError::Config(format!("Invalid {ENV_POLL_INTERVAL_MS} in environment: {e}"))
            })?;
            debug!(
                "Overriding worker.poll_interval_ms from environment: {}",
                parsed
            );
            self.worker.poll_interval_ms = parsed;
        }

        if let Ok(threshold) = std::env::var(ENV_BREAKER_FAILURE_THRESHOLD) {
            let parsed = threshold.parse::<u32>().map_err(|e| {
                PlexusError::Config(format!(
                    "Invalid {ENV_BREAKER_FAILURE_THRESHOLD} in environment: {e}"
                ))
            })?;
            debug!(
                "Overriding breaker.failure_threshold from environment: {}",
                parsed
            );
            self.breaker.failure_threshold = parsed;
        }

        Ok(())
    }
}

//! # Worker Configuration
//!
//! A single [`WorkerConfig`] value is built once at start-up by [`ConfigManager`] and
//! shared by reference with every component that needs it. Nothing mutates it after
//! loading.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults ([`WorkerConfig::default`])
//! 2. `config/worker.{toml,yaml,json}`
//! 3. `config/worker.{environment}.{toml,yaml,json}`
//! 4. `WORKER__SECTION__FIELD` environment variables
//! 5. Legacy variables: `R_WORKER_URL`, `API_URL`, `EXPERIMENT_ID`, `CELL_SETS_DIR`
//!
//! ```rust,no_run
//! use analysis_worker::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let url = &manager.config().r_worker.url;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Remote compute backend settings
    pub r_worker: RWorkerConfig,

    /// Retry policy for remote compute calls
    pub retry: RetryConfig,

    /// Experiment API forwarded to tasks that patch external state
    pub api: ApiConfig,

    /// Request loop settings
    pub worker: WorkerLoopConfig,

    /// Local cell set storage
    pub cell_sets: CellSetsConfig,

    /// Result caching
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RWorkerConfig {
    pub url: String,
    /// Per-attempt HTTP timeout
    pub request_timeout_ms: u64,
}

/// Exponential backoff bounded by a total elapsed budget
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    pub max_elapsed_seconds: u64,
    pub jitter_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerLoopConfig {
    /// Experiment this worker serves, when pinned
    pub experiment_id: Option<String>,
    pub idle_timeout_seconds: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CellSetsConfig {
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            r_worker: RWorkerConfig {
                url: "http://localhost:4000".to_string(),
                request_timeout_ms: 300_000,
            },
            retry: RetryConfig {
                initial_interval_ms: 1000,
                max_interval_ms: 16_000,
                multiplier: 2.0,
                max_elapsed_seconds: 30,
                jitter_enabled: true,
            },
            api: ApiConfig {
                url: "http://localhost:3000".to_string(),
            },
            worker: WorkerLoopConfig {
                experiment_id: None,
                idle_timeout_seconds: 3600,
                poll_interval_ms: 250,
            },
            cell_sets: CellSetsConfig {
                directory: "data/cell_sets".to_string(),
            },
            cache: CacheConfig {
                enabled: true,
                ttl_seconds: 3600,
                max_size: 1000,
            },
        }
    }
}

impl WorkerConfig {
    /// Validate values that would otherwise fail late, at request time
    pub fn validate(&self) -> ConfigResult<()> {
        if self.r_worker.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "url",
                "r_worker",
            ));
        }
        if self.r_worker.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "r_worker.request_timeout_ms",
                self.r_worker.request_timeout_ms,
                "must be greater than zero",
            ));
        }
        if self.retry.max_elapsed_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_elapsed_seconds",
                self.retry.max_elapsed_seconds,
                "retry budget must be greater than zero",
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.retry.multiplier,
                "backoff multiplier must be at least 1.0",
            ));
        }
        if self.retry.initial_interval_ms > self.retry.max_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.initial_interval_ms",
                self.retry.initial_interval_ms,
                "initial interval exceeds max_interval_ms",
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.poll_interval_ms",
                self.worker.poll_interval_ms,
                "a zero poll interval spins on an empty queue",
            ));
        }
        if self.worker.idle_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.idle_timeout_seconds",
                self.worker.idle_timeout_seconds,
                "must be greater than zero",
            ));
        }
        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_size",
                self.cache.max_size,
                "an enabled cache needs room for at least one entry",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.r_worker.request_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.idle_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_elapsed_seconds, 30);
    }

    #[test]
    fn test_empty_r_worker_url_is_rejected() {
        let mut config = WorkerConfig::default();
        config.r_worker.url = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_shrinking_multiplier_is_rejected() {
        let mut config = WorkerConfig::default();
        config.retry.multiplier = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_poll_interval_and_idle_timeout_are_rejected() {
        let mut config = WorkerConfig::default();
        config.worker.poll_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker.poll_interval_ms"));

        let mut config = WorkerConfig::default();
        config.worker.idle_timeout_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker.idle_timeout_seconds"));
    }
}

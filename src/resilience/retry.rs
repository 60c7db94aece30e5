//! # Bounded Exponential Retry
//!
//! [`RetryPolicy`] is a plain configuration value composed around a call site. Only
//! attempts that report [`AttemptError::Transient`] are retried; the total time spent
//! is capped by `max_elapsed`, after which the caller gets
//! [`RetryFailure::Exhausted`].

use crate::config::RetryConfig;
use crate::error::WorkerError;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const JITTER_FACTOR: f64 = 0.1;

/// Outcome of a single attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Worth retrying (network fault, non-2xx status)
    Transient(String),
    /// Surfaces immediately
    Permanent(WorkerError),
}

impl AttemptError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }
}

impl From<WorkerError> for AttemptError {
    fn from(error: WorkerError) -> Self {
        AttemptError::Permanent(error)
    }
}

#[derive(Debug)]
pub enum RetryFailure {
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: String,
    },
    Permanent(WorkerError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub max_elapsed: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&crate::config::WorkerConfig::default().retry)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            multiplier: config.multiplier,
            max_elapsed: Duration::from_secs(config.max_elapsed_seconds),
            jitter: config.jitter_enabled,
        }
    }
}

impl RetryPolicy {
    /// Sleep before retry number `attempt` (1-based), before jitter
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_interval.as_secs_f64() {
            return self.max_interval;
        }
        Duration::from_secs_f64(scaled)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter {
            delay
                .mul_f64(1.0 + fastrand::f64() * JITTER_FACTOR)
                .min(self.max_interval)
        } else {
            delay
        }
    }

    /// Run `attempt` until it succeeds, fails permanently, or the budget runs out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let last_error = match attempt().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(
                            operation = %operation,
                            attempts = attempts,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(AttemptError::Permanent(error)) => return Err(RetryFailure::Permanent(error)),
                Err(AttemptError::Transient(message)) => message,
            };

            let elapsed = started.elapsed();
            let Some(remaining) = self.max_elapsed.checked_sub(elapsed).filter(|r| !r.is_zero())
            else {
                warn!(
                    operation = %operation,
                    attempts = attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %last_error,
                    "Retry budget exhausted"
                );
                return Err(RetryFailure::Exhausted {
                    attempts,
                    elapsed,
                    last_error,
                });
            };

            let delay = self.jittered(self.backoff_for(attempts)).min(remaining);
            warn!(
                operation = %operation,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Transient failure, will retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

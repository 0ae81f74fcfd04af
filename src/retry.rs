//! Bounded retries with exponential backoff around every catalog call.
//!
//! Each invocation walks `Attempting(n) -> Success | Retrying(delay) | Failed`.
//! Failures are classified first; only retryable kinds are retried, and a
//! rate-limit response with a server-provided `Retry-After` waits exactly that long.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, ClassifiedError, RetryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_factor(self.backoff_multiplier as f32)
            .with_max_times(self.max_attempts as usize)
            .build()
    }
}

/// Suspension point for backoff and throttle delays.
///
/// Production code sleeps on the tokio timer; tests substitute a virtual clock.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What to do after attempt `n` failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

#[derive(Clone)]
pub struct RetryExecutor {
    policy: Arc<RetryPolicy>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    pub fn new(policy: Arc<RetryPolicy>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    /// Decide whether a failed attempt is retried and after how long.
    ///
    /// `backoff_delay` is the un-jittered exponential delay for this attempt.
    pub fn decide(
        &self,
        attempt: u32,
        error: &ClassifiedError,
        backoff_delay: Duration,
    ) -> RetryDecision {
        if !error.retryable() || attempt >= self.policy.max_attempts {
            return RetryDecision::GiveUp;
        }

        if let Some(retry_after_ms) = error.retry_after_ms() {
            return RetryDecision::Retry(Duration::from_millis(retry_after_ms));
        }

        let delay = if self.policy.jitter {
            backoff_delay.mul_f64(rand::rng().random_range(0.5..=1.0))
        } else {
            backoff_delay
        };
        RetryDecision::Retry(delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let max_delay = Duration::from_millis(self.policy.max_delay_ms);
        let mut backoff = self.policy.backoff();
        let mut attempt = 1;

        loop {
            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        log::debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => ClassifiedError::from(error),
            };

            let backoff_delay = backoff.next().unwrap_or(max_delay);
            match self.decide(attempt, &error, backoff_delay) {
                RetryDecision::Retry(delay) => {
                    log::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        attempt,
                        self.policy.max_attempts,
                        delay,
                        error
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    if error.retryable() {
                        log::error!(
                            "{} failed after {} attempt(s): {}",
                            operation,
                            attempt,
                            error
                        );
                    } else {
                        log::debug!("{} failed with non-retryable error: {}", operation, error);
                    }
                    return Err(RetryError {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }
}

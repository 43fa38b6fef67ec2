//! Retry policy for a single vendor call
//!
//! Retries are opt-in and scoped to one turn: the tool loop wraps each
//! `execute_request` in a [`RetryExecutor`]. With the default policy every
//! turn makes exactly one vendor call, and failures go straight to fallback.

use crate::providers::error::{ClassifiedError, ProviderError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Backoff settings for retrying one turn's vendor call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first call; 0 disables retrying
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Backoff multiplier per retry
    pub exponential_base: f64,
    /// Fraction of the delay randomized in either direction, 0.0..=1.0
    pub jitter_factor: f64,
    /// Wait the classifier's suggested delay (e.g. a 429 `retry_after`) instead of backing off
    pub respect_retry_after: bool,
    /// Budget for the whole retry sequence of one call
    pub timeout_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    /// Retry up to `max_retries` times with the standard backoff
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::standard()
        }
    }

    /// Three retries, doubling from 100ms up to 10s
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
            jitter_factor: 0.1,
            respect_retry_after: true,
            timeout_ms: Some(30_000),
        }
    }

    /// A policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// Calculate the delay for a given retry attempt
    pub fn calculate_delay(&self, attempt: u32, error: &ClassifiedError) -> Duration {
        if self.respect_retry_after {
            if let Some(delay_ms) = error.suggested_delay_ms {
                return Duration::from_millis(delay_ms);
            }
        }

        let base_delay = self.initial_delay_ms as f64 * self.exponential_base.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rng.gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Check if we should retry based on the classification and attempt count
    pub fn should_retry(&self, error: &ClassifiedError, attempt: u32) -> bool {
        attempt < self.max_retries && error.should_retry
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryResult<T> {
    pub result: Result<T, ProviderError>,

    /// Number of retries made after the initial attempt
    pub retries: u32,

    /// Total time spent sleeping between attempts
    pub total_delay_ms: u64,
}

/// Executor for retry operations
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation`, retrying while the classified error allows it
    pub async fn execute<F, Fut, T, C>(&self, classify: C, mut operation: F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        C: Fn(&ProviderError) -> ClassifiedError,
    {
        let mut retries = 0;
        let mut total_delay_ms = 0;
        let start_time = Instant::now();

        loop {
            let error = match operation().await {
                Ok(value) => {
                    return RetryResult {
                        result: Ok(value),
                        retries,
                        total_delay_ms,
                    }
                }
                Err(error) => error,
            };

            let classified = classify(&error);
            let timed_out = self
                .policy
                .timeout_ms
                .is_some_and(|limit| start_time.elapsed().as_millis() > limit as u128);
            if timed_out || !self.policy.should_retry(&classified, retries) {
                return RetryResult {
                    result: Err(error),
                    retries,
                    total_delay_ms,
                };
            }

            let delay = self.policy.calculate_delay(retries, &classified);
            warn!(
                error = %error,
                category = ?classified.category,
                retry = retries + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying vendor call"
            );
            total_delay_ms += delay.as_millis() as u64;
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ErrorClassifier;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
            ..RetryPolicy::standard()
        }
    }

    #[test]
    fn test_default_policy_never_retries() {
        let policy = RetryPolicy::default();
        let classified = ErrorClassifier::classify(&ProviderError::Timeout("slow".to_string()));
        assert!(classified.should_retry);
        assert!(!policy.should_retry(&classified, 0));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 300,
            jitter_factor: 0.0,
            ..RetryPolicy::standard()
        };
        let classified = ErrorClassifier::classify(&ProviderError::Network("reset".to_string()));
        assert_eq!(policy.calculate_delay(0, &classified), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1, &classified), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(5, &classified), Duration::from_millis(300));
    }

    #[test]
    fn test_suggested_delay_wins() {
        let policy = no_jitter(3);
        let classified = ErrorClassifier::classify(&ProviderError::from_status(429, None));
        assert_eq!(policy.calculate_delay(0, &classified), Duration::from_millis(60_000));
    }

    #[tokio::test]
    async fn test_executor_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(no_jitter(2));

        let outcome = executor
            .execute(ErrorClassifier::classify, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderError::from_status(503, None))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 1);
        assert_eq!(outcome.retries, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_executor_stops_on_unrecoverable() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(no_jitter(5));

        let outcome: RetryResult<()> = executor
            .execute(ErrorClassifier::classify, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::from_status(401, None)) }
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

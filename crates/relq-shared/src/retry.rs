//! Retrying fallible async operations with exponential backoff

use crate::config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Delay schedule derived from a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay after the 0-based `attempt` failed, capped and jittered.
    ///
    /// Growth that overflows, or a multiplier that is not a finite
    /// non-negative number, yields `max_delay_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_ms = self.config.max_delay_ms as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let grown = self.config.initial_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let capped = if grown.is_finite() && grown >= 0.0 {
            grown.min(max_ms)
        } else {
            max_ms
        };
        let jitter = fastrand::u64(0..=self.config.jitter_ms);
        Duration::from_millis((capped as u64).saturating_add(jitter))
    }

    /// Whether another attempt follows the failed 0-based `attempt`.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.config.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Run `operation` until it succeeds, fails with an error `is_transient`
    /// rejects, or the attempts run out. The last error is returned.
    pub async fn retry<F, Fut, T, E>(
        &self,
        mut operation: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) if !is_transient(&error) => {
                    warn!(%error, "operation failed with a permanent error");
                    return Err(error);
                }
                Err(error) if !self.allows_retry(attempt) => {
                    warn!(attempts = attempt + 1, %error, "operation failed, giving up");
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts(),
                        ?delay,
                        %error,
                        "operation failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// [`ExponentialBackoff::retry`] bounded by an overall deadline.
    pub async fn retry_within<F, Fut, T, E>(
        &self,
        deadline: Duration,
        operation: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        tokio::time::timeout(deadline, self.retry(operation, is_transient))
            .await
            .map_err(|_| RetryError::Timeout(deadline))?
            .map_err(RetryError::Operation)
    }
}

/// Failure of a deadline-bounded retry
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Operation failed: {0}")]
    Operation(E),

    #[error("Operation did not succeed within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("flaky")]
        Flaky,
        #[error("broken")]
        Broken,
    }

    fn transient(e: &TestError) -> bool {
        *e == TestError::Flaky
    }

    fn backoff(max_attempts: u32) -> ExponentialBackoff {
        ExponentialBackoff::new(RetryConfig {
            initial_delay_ms: 10,
            max_delay_ms: 1000,
            multiplier: 2.0,
            jitter_ms: 5,
            max_attempts,
        })
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let calls = AtomicU32::new(0);
        let result = backoff(3)
            .retry(
                || async {
                    if calls.fetch_add(1, Ordering::Relaxed) < 2 {
                        Err(TestError::Flaky)
                    } else {
                        Ok("success")
                    }
                },
                transient,
            )
            .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = backoff(2)
            .retry(
                || async {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Err(TestError::Flaky)
                },
                transient,
            )
            .await;

        assert_eq!(result, Err(TestError::Flaky));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = backoff(5)
            .retry(
                || async {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Err(TestError::Broken)
                },
                transient,
            )
            .await;

        assert_eq!(result, Err(TestError::Broken));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = ExponentialBackoff::new(RetryConfig {
            jitter_ms: 0,
            ..backoff(10).config
        });
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(40));
        assert_eq!(policy.delay(20), Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_never_overflows() {
        let policy = backoff(100);
        for attempt in 0..100 {
            assert!(policy.delay(attempt) <= Duration::from_millis(1005));
        }
        assert!(policy.delay(u32::MAX) <= Duration::from_millis(1005));
    }

    #[test]
    fn test_invalid_multiplier_falls_back_to_max_delay() {
        for multiplier in [f64::NAN, f64::INFINITY, -3.0] {
            let policy = ExponentialBackoff::new(RetryConfig {
                multiplier,
                jitter_ms: 0,
                ..backoff(5).config
            });
            assert_eq!(policy.delay(1), Duration::from_millis(1000));
        }
    }

    #[tokio::test]
    async fn test_deadline() {
        let result: Result<&str, RetryError<TestError>> = backoff(1)
            .retry_within(
                Duration::from_millis(50),
                || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok("success")
                },
                transient,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Timeout(_))));
    }
}

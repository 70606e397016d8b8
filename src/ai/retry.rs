//! Retry Policy with Exponential Backoff
//!
//! A logical request is attempted up to `max_attempts` times in total. After a
//! retryable failure on zero-based attempt `k` the next attempt is delayed by
//!
//! ```text
//! base_delay * 2^k + random(0..max_jitter)
//! ```
//!
//! Only failures classified as [`Disposition::Retryable`] trigger another
//! attempt. Fatal dispositions end the loop immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::constants::retry as retry_constants;
use crate::types::{Disposition, GatewayError, GatewayResult};

/// Backoff parameters for one gateway
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    /// Delay after the first failure, doubled per attempt
    pub base_delay: Duration,
    /// Exclusive upper bound of random jitter
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry_constants::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(retry_constants::BASE_DELAY_MS),
            max_jitter: Duration::from_millis(retry_constants::MAX_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Deterministic part of the delay after zero-based attempt `failed_attempt`
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.min(retry_constants::MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Full delay after zero-based attempt `failed_attempt`, jitter included
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        self.backoff_for(failed_attempt) + random_jitter(self.max_jitter)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` receives the zero-based attempt index.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> GatewayResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Disposition>>,
    {
        let mut state = RetryState::default();

        loop {
            let attempt = state.attempt;
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(Disposition::Fatal(err)) => {
                    return Err(err.with_attempts(attempt + 1));
                }
                Err(Disposition::Retryable { cause, message }) => {
                    let attempts_made = attempt + 1;
                    state.last_error = Some(
                        GatewayError::request_failed(cause, message)
                            .with_attempts(attempts_made),
                    );

                    if attempts_made >= self.max_attempts {
                        warn!(
                            attempts = attempts_made,
                            %cause,
                            "Retries exhausted"
                        );
                        return Err(state.into_error());
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempts_made,
                        max_attempts = self.max_attempts,
                        %cause,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying after backoff"
                    );
                    sleep(delay).await;
                    state.attempt += 1;
                }
            }
        }
    }
}

/// Progress of one logical request through the retry loop
#[derive(Debug, Default)]
pub struct RetryState {
    /// Zero-based index of the current attempt
    pub attempt: u32,
    /// Most recent retryable failure
    pub last_error: Option<GatewayError>,
}

impl RetryState {
    fn into_error(self) -> GatewayError {
        self.last_error.unwrap_or_else(|| {
            GatewayError::request_failed(
                crate::types::FailureCause::InvalidResponse,
                "retry loop ended without an error",
            )
            .with_attempts(self.attempt + 1)
        })
    }
}

/// Random jitter in `0..max` using the thread-local RNG
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorClassifier, FailureCause};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn reset() -> Disposition {
        ErrorClassifier::classify_network(FailureCause::ConnectionReset, "connection reset by peer")
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_exponent_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(40), policy.backoff_for(16));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay < Duration::from_millis(2500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let result = policy
            .run(|_| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(reset())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_grow_exponentially() {
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let policy = RetryPolicy::default();

        let _ = policy
            .run(|_| {
                let starts = Arc::clone(&starts);
                async move {
                    starts.lock().unwrap().push(Instant::now());
                    Err::<(), _>(reset())
                }
            })
            .await;

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        for k in 0..2 {
            let gap = starts[k + 1].duration_since(starts[k]);
            assert!(gap >= Duration::from_millis(1000 << k), "gap {k}: {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts_and_cause() {
        let policy = RetryPolicy::default();
        let err = policy
            .run(|_| async { Err::<(), _>(reset()) })
            .await
            .unwrap_err();

        match err {
            GatewayError::RequestFailed {
                cause, attempts, ..
            } => {
                assert_eq!(cause, FailureCause::ConnectionReset);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let err = policy
            .run(|_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ErrorClassifier::classify_http_status(401, "invalid token"))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::AuthFailed { status: 401, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert_eq!(policy.max_attempts, 1);

        let err = policy
            .run(|_| async { Err::<(), _>(reset()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RequestFailed { attempts: 1, .. }));
    }
}

//! Retry combinator for transient provider failures.
//!
//! `with_retry` wraps any async operation in a bounded exponential-backoff
//! loop. Retry logic stays testable independent of the wrapped call; the
//! backoff sleep is a cooperative suspension point, never a busy wait.

use crate::error::{PilotError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff policy for `with_retry`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    /// Delay before the second attempt. Doubles on each failure.
    pub base_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retrying after the given failed attempt (1-based),
    /// with ±20% multiplicative jitter.
    fn delay_after(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// The final error is re-raised annotated with the attempt count.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_retries.max(1);
    let mut last_error: Option<PilotError> = None;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Attempt {} of {} failed: {}", attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    match last_error {
        Some(e) => Err(PilotError::Gateway(format!(
            "{} (after {} attempts)",
            e, attempts
        ))),
        None => Err(PilotError::Gateway(
            "retry loop finished without running the operation".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42u32) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PilotError::Gateway("transient".to_string()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_annotates_attempt_count() {
        let result: Result<()> = with_retry(&fast_policy(), || async {
            Err(PilotError::Gateway("provider down".to_string()))
        })
        .await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("provider down"));
        assert!(message.contains("after 3 attempts"));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        // 2^(6-1) = 32s exponential, capped at 10s, jitter at most +20%.
        let delay = policy.delay_after(6);
        assert!(delay <= Duration::from_secs_f64(12.0));
        assert!(delay >= Duration::from_secs_f64(8.0));
    }
}

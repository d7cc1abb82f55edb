//! Retry policy for per-entity Azure calls
//!
//! Transient failures are retried with exponential backoff; anything else is
//! returned after the first attempt. The result always says how many attempts
//! were made so outcomes can report it.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::errors::AzureError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

/// Final result of a retried call
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, AzureError>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Delay after the `attempt`-th failure (1-based), before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Equal jitter: half the delay fixed, half random
    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay.as_millis() as u64 / 2;
        let extra = rand::rng().random_range(0..=half);
        Duration::from_millis(half + extra)
    }

    /// Run `operation` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AzureError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.jittered(self.delay_for_attempt(attempt));
                    warn!(
                        "{} failed transiently (attempt {}/{}), retrying in {}ms: {}",
                        label,
                        attempt,
                        self.max_attempts,
                        delay.as_millis(),
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let e = if e.is_transient() {
                        AzureError::transient(format!("{} (gave up after {} attempts)", e.message, attempt))
                    } else {
                        e
                    };
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(4),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(3000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..fast_policy(3)
        };
        for _ in 0..100 {
            let delay = policy.jittered(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let outcome = fast_policy(5)
            .run("probe", |_| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AzureError::transient("429 Too Many Requests"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = fast_policy(5)
            .run("probe", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AzureError::not_found("ResourceNotFound"))
            })
            .await;

        assert!(outcome.result.unwrap_err().is_not_found());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = fast_policy(4)
            .run("probe", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AzureError::transient("503"))
            })
            .await;

        let err = outcome.result.unwrap_err();
        assert!(err.message.contains("gave up after 4 attempts"));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}

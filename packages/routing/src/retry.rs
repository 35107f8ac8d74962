//! Bounded retry of transient provider faults.
//!
//! Wraps every contract call made through the resilient layer. Only
//! errors flagged retryable by the canonical taxonomy (rate limiting,
//! unavailability) are re-attempted, with exponential backoff. Terminal
//! errors — authentication failures, invalid payloads, "no route" —
//! propagate immediately.

use std::future::Future;
use std::time::Duration;

use saferoute_routing_models::ProviderError;

/// Default number of attempts per provider (1 initial + 2 retries).
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base; delays are `base << attempt` (500ms, 1s, 2s).
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry policy applied to a single provider's contract calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit bounds.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            base_delay,
        }
    }

    /// A policy with no backoff delay, for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Runs `op`, retrying retryable errors up to the attempt bound.
    ///
    /// The closure is called once per attempt to build a fresh future.
    ///
    /// # Errors
    ///
    /// Returns the final [`ProviderError`] once attempts are exhausted,
    /// or immediately for terminal errors.
    pub async fn run<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    log::warn!(
                        "{op_name} attempt {}/{} failed ({e}), retrying in {delay:?}...",
                        attempt + 1,
                        self.max_attempts,
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> ProviderError {
        ProviderError::Unavailable {
            provider: "test".to_string(),
            message: "HTTP 503".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_first_try_without_retrying() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let result: Result<u32, _> = policy
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_bound() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let result: Result<u32, _> = policy
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(unavailable()) }
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Unavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_when_a_retry_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let result: Result<u32, _> = policy
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(unavailable())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_propagate_immediately() {
        fn terminal(kind: u8) -> ProviderError {
            match kind {
                0 => ProviderError::NoRouteFound,
                1 => ProviderError::AuthenticationFailed {
                    provider: "test".to_string(),
                },
                _ => ProviderError::InvalidResponse {
                    provider: "test".to_string(),
                    message: "garbled".to_string(),
                },
            }
        }

        for kind in 0..3u8 {
            let calls = AtomicU32::new(0);
            let policy = RetryPolicy::immediate(5);
            let result: Result<u32, _> = policy
                .run("op", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(terminal(kind)) }
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}

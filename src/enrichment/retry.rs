//! Fixed-delay retry for provider requests

use std::future::Future;
use std::time::Duration;

use crate::enrichment::ProviderError;
use crate::models::Provider;

/// Retry configuration for a provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Run `operation` until it succeeds, fails with an error `retryable` rejects,
/// or the policy runs out of attempts. The last error is returned.
pub async fn with_retry<T, F, Fut, P>(
    policy: RetryPolicy,
    provider: Provider,
    retryable: P,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    P: Fn(&ProviderError) -> bool,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && retryable(&e) => {
                tracing::warn!(
                    provider = %provider,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Request failed, retrying"
                );
                metrics::counter!("provider_retries_total", "provider" => provider.as_str())
                    .increment(1);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    fn transient() -> ProviderError {
        ProviderError::Transport {
            provider: Provider::AbuseIpDb,
            message: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = with_retry(fast(3), Provider::AbuseIpDb, ProviderError::is_retryable, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> =
            with_retry(fast(3), Provider::AbuseIpDb, ProviderError::is_retryable, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert_eq!(result, Err(transient()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> =
            with_retry(fast(3), Provider::VirusTotal, ProviderError::is_retryable, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::RateLimited {
                    provider: Provider::VirusTotal,
                })
            })
            .await;

        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}

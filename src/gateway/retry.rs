use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{GatewayError, ProviderFailure};

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based): 1s, 2s, 4s...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay
            .saturating_mul(self.multiplier.saturating_pow(retry))
    }
}

/// Default classifier: rate limits, server errors and connection resets
pub fn is_retryable(err: &GatewayError) -> bool {
    match err {
        GatewayError::Provider(failure) => failure.is_retryable(),
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent
pub async fn with_retry<T, F, Fut, C>(
    policy: &RetryPolicy,
    label: &str,
    classify: C,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
    C: Fn(&GatewayError) -> bool,
{
    let mut retry = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !classify(&err) {
            return Err(err);
        }

        if retry >= policy.max_retries {
            return Err(match err {
                GatewayError::Provider(last) => GatewayError::RetryExhausted {
                    attempts: retry + 1,
                    last,
                },
                other => other,
            });
        }

        let delay = policy.delay_for(retry);
        warn!(
            "{} failed ({}), retrying in {:?} ({}/{})",
            label,
            err,
            delay,
            retry + 1,
            policy.max_retries
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

/// Race a provider call against a deadline
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, ProviderFailure>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(GatewayError::Provider(failure)),
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_server_errors() {
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result = with_retry(&RetryPolicy::default(), "test", is_retryable, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(GatewayError::Provider(ProviderFailure::http(500, "boom")))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> =
            with_retry(&RetryPolicy::default(), "test", is_retryable, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Provider(ProviderFailure::http(429, "slow down")))
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result {
            Err(GatewayError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last.status, Some(429));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> =
            with_retry(&RetryPolicy::default(), "test", is_retryable, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Provider(ProviderFailure::http(400, "bad request")))
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GatewayError::Provider(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let result: Result<(), _> = with_timeout(Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(GatewayError::Timeout(Duration::from_secs(30))));
    }
}

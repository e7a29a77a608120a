//! Exponential-backoff retry engine wrapping every operation the filesystem
//! facade issues, per `[4.K]`'s retry policy.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::client::config::RetryPolicy;
use crate::client::error::ClientError;

/// Runs `op` up to `policy.max_attempts` times, waiting `delay` between
/// attempts and multiplying `delay` by `policy.multiplier` (capped at
/// `policy.max_delay`) after each retryable failure. Non-retryable errors
/// and the final attempt's error both surface immediately.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                debug!(attempt, delay_ms = delay.as_millis(), error = %err, "retrying after transient error");
                tokio::time::sleep(delay).await;
                delay = scale(delay, policy.multiplier, policy.max_delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn scale(delay: Duration, multiplier: f64, max_delay: Duration) -> Duration {
    let scaled_nanos = (delay.as_nanos() as f64 * multiplier).min(max_delay.as_nanos() as f64);
    Duration::from_nanos(scaled_nanos as u64).min(max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, initial_delay: Duration::from_millis(1), max_delay: Duration::from_millis(4), multiplier: 2.0 }
    }

    #[tokio::test]
    async fn succeeds_without_retrying_on_the_first_try() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result = retry(&fast_policy(3), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ClientError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_a_retryable_error_up_to_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<(), ClientError> = retry(&fast_policy(3), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::PoolExhausted)
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_a_non_retryable_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<(), ClientError> = retry(&fast_policy(5), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::InvalidConfig("bad".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_a_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result = retry(&fast_policy(3), || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ClientError::ConnectionClosed)
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scale_caps_at_max_delay() {
        let scaled = scale(Duration::from_secs(4), 2.0, Duration::from_secs(5));
        assert_eq!(scaled, Duration::from_secs(5));
    }
}

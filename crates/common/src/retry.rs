//! Retry with exponential backoff for outbound model calls
//!
//! Only errors whose [`AppError::is_retryable`] is true are retried; a
//! malformed response or a 4xx fails on the first attempt.

use crate::errors::{AppError, Result};
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay before the second attempt; doubles after each failure
pub const INITIAL_INTERVAL: Duration = Duration::from_millis(100);

fn policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(INITIAL_INTERVAL)
        .with_multiplier(2.0)
        .with_max_interval(Duration::from_secs(5))
        // Attempts are capped by the caller, not by wall time
        .with_max_elapsed_time(None)
        .build()
}

/// Statuses worth another attempt: overload, timeouts and server errors
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Run `operation` up to `max_attempts` times, backing off between attempts
pub async fn with_backoff<T, F, Fut>(name: &str, max_attempts: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    retry(policy(), || {
        attempt += 1;
        let current = attempt;
        let call = operation();
        async move {
            call.await.map_err(|e: AppError| {
                if !e.is_retryable() || current >= max_attempts {
                    backoff::Error::permanent(e)
                } else {
                    warn!(
                        operation = name,
                        attempt = current,
                        max_attempts,
                        error = %e,
                        "Request failed, retrying"
                    );
                    backoff::Error::transient(e)
                }
            })
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_transient_error_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", 3, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::scoring_transient("503"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("test", 3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::scoring("expected 3 scores, scorer returned 2"))
        })
        .await;

        assert!(matches!(result, Err(AppError::ScoringFailure { retryable: false, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_capped() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("test", 2, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::embedding_transient("connection reset"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

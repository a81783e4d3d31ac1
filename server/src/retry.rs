use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Backoff schedule for transient provider failures. Three attempts after the
/// first, waiting 2s/4s/8s between them.
pub const BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// Only 5xx-class responses, timeouts and connection drops are worth another
/// attempt. 429 surfaces immediately so the caller can trigger its backoff
/// flag, and 4xx are the caller's fault.
pub fn is_retryable(error: &AppError) -> bool {
    match error {
        AppError::RequestTimeout => true,
        AppError::TooManyRequests => false,
        AppError::BadRequest(_)
        | AppError::NotFound(_)
        | AppError::Unauthorized(_)
        | AppError::ReAuthRequired(_)
        | AppError::Conflict(_) => false,
        AppError::Internal(e) => match e.downcast_ref::<reqwest::Error>() {
            Some(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error())
            }
            None => false,
        },
        _ => false,
    }
}

/// Runs `op` until it succeeds, exhausting [`BACKOFF_SCHEDULE`] on retryable
/// errors. Non-retryable errors return on the spot.
pub async fn with_backoff<T, F, Fut>(label: &str, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut schedule = BACKOFF_SCHEDULE.iter();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) => match schedule.next() {
                Some(delay) => {
                    tracing::warn!("{label} failed, retrying in {delay:?}: {err:?}");
                    tokio::time::sleep(*delay).await;
                }
                None => {
                    tracing::error!("{label} failed after retries: {err:?}");
                    return Err(err);
                }
            },
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_client_errors_are_not_retryable() {
        assert!(!is_retryable(&AppError::BadRequest("nope".into())));
        assert!(!is_retryable(&AppError::NotFound("gone".into())));
        assert!(!is_retryable(&AppError::TooManyRequests));
        assert!(is_retryable(&AppError::RequestTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_backoff_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::RequestTimeout)
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_backoff_gives_up_after_schedule() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::RequestTimeout)
        })
        .await;

        assert!(result.is_err());
        // Initial attempt plus one per schedule entry.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_with_backoff_fails_fast_on_client_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::BadRequest("bad".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

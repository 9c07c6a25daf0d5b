//! Retry helpers for transient failures.

use crate::types::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Run `operation`, and if it fails with a transient error run it exactly
/// once more after `backoff`. Permanent errors are returned immediately.
pub async fn retry_once<F, Fut, T>(label: &str, backoff: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match operation().await {
        Ok(value) => Ok(value),
        Err(err) if err.is_transient() => {
            tracing::debug!(
                "{} failed with transient error, retrying in {:?}: {}",
                label,
                backoff,
                err
            );
            sleep(backoff).await;
            operation().await
        }
        Err(err) => Err(err),
    }
}

/// Like [`retry_once`] but bounds every attempt with `timeout`.
pub async fn retry_once_with_timeout<F, Fut, T>(
    label: &str,
    timeout: Duration,
    backoff: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_once(label, backoff, || {
        let attempt = operation();
        async move {
            match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(crate::types::AppError::Timeout(format!(
                    "{} exceeded {:?}",
                    label, timeout
                ))),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_once("op", Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::Upstream {
                    message: "503".into(),
                    transient: true,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_once("op", Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::InvalidInput("bad query".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_attempt_can_succeed() {
        let calls = AtomicUsize::new(0);
        let result = retry_once("op", Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AppError::Timeout("slow".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_once_with_timeout(
            "slow-op",
            Duration::from_millis(10),
            Duration::from_millis(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

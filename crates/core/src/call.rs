//! Deadline and retry policy for remote calls.
//!
//! Each attempt runs under its own timeout. A transient failure
//! (`AppError::is_transient`) is retried up to `retries` times; anything else
//! is returned immediately. Dropping the returned future cancels the
//! in-flight attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl CallPolicy {
    /// One attempt plus a single retry.
    pub fn retry_once(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            retries: 1,
        }
    }

    pub fn no_retry(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            retries: 0,
        }
    }
}

/// Run `f` under `policy`, naming the call `name` in logs.
pub async fn bounded_call<T, F, Fut>(name: &str, policy: CallPolicy, mut f: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(policy.timeout.as_millis() as u64)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.retries => {
                attempt += 1;
                tracing::warn!(call = name, attempt, error = %err, "Remote call failed, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = bounded_call("flaky", CallPolicy::retry_once(1_000), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Llm("connection reset".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = bounded_call("down", CallPolicy::retry_once(1_000), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::VectorStore("unreachable".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::VectorStore(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = bounded_call("bad", CallPolicy::retry_once(1_000), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Prompt("missing variable".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let result: AppResult<()> = bounded_call("slow", CallPolicy::retry_once(10), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(10))));
    }
}

use crate::Result;
use std::future::Future;
use tokio::time::{sleep, Duration};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 2000;

/// Bounded retry with a fixed backoff
///
/// Only errors for which `BotError::is_retryable` holds are retried; anything
/// else fails immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `op`, retrying recoverable failures
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("✓ {} succeeded after {} attempts", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "Attempt {}/{} of {} failed: {}. Retrying in {:?}...",
                        attempt,
                        self.max_attempts,
                        operation,
                        e,
                        self.backoff
                    );
                    sleep(self.backoff).await;
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
    use crate::BotError;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let calls = Cell::new(0);
        let result = fast(3)
            .run("op", || {
                calls.set(calls.get() + 1);
                async { Ok::<_, BotError>(5) }
            })
            .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retries_rate_limits_then_succeeds() {
        let calls = Cell::new(0);
        let result = fast(3)
            .run("op", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(BotError::RateLimited("-1003".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = fast(3)
            .run("op", || {
                calls.set(calls.get() + 1);
                async { Err(BotError::RateLimited("429".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(BotError::RateLimited(_))));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = Cell::new(0);
        let result: Result<()> = fast(5)
            .run("op", || {
                calls.set(calls.get() + 1);
                async {
                    Err(BotError::OrderRejected {
                        code: -1013,
                        msg: "too small".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}

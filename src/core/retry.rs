//! Bounded retry for `INVALID_INPUT_ARGUMENT` rejections
//!
//! While sibling rules are still being created or reordered, ZIA answers
//! create/update calls with `INVALID_INPUT_ARGUMENT` (typically because the
//! requested order does not exist yet). Those calls are retried with a fixed
//! sleep until the resource-level timeout. Rank/order conflicts are the one
//! `INVALID_INPUT_ARGUMENT` that never resolves by waiting, so they fail
//! immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use super::error::{Error, Result};

/// Retry timing for create/update calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Sleep between attempts
    pub interval: Duration,
    /// Total time budget, measured from the first attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(20 * 60),
        }
    }
}

/// Runs `op` until it succeeds, fails with anything other than a retryable
/// `INVALID_INPUT_ARGUMENT`, or the policy's timeout elapses.
///
/// # Errors
///
/// Returns the last error of `op` when it is not retryable or when the
/// timeout has elapsed.
pub async fn retry_on_invalid_input<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if e.is_invalid_input() && !is_rank_order_conflict(&e) => {
                if start.elapsed() + policy.interval > policy.timeout {
                    warn!(operation, attempt, error = %e, "Giving up after retry timeout");
                    return Err(e);
                }
                warn!(
                    operation,
                    attempt,
                    error = %e,
                    wait_secs = policy.interval.as_secs(),
                    "INVALID_INPUT_ARGUMENT, retrying"
                );
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_rank_order_conflict(error: &Error) -> bool {
    matches!(error, Error::RankOrderConflict { .. }) || error.rank_order_conflict().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn invalid_input(message: &str) -> Error {
        Error::Api {
            status: 400,
            code: "INVALID_INPUT_ARGUMENT".into(),
            message: message.into(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_on_invalid_input(fast_policy(), "create", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(invalid_input("Invalid order"))
            } else {
                Ok(5)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_invalid_input(fast_policy(), "create", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api {
                status: 403,
                code: "NOT_AUTHORIZED".into(),
                message: "no".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rank_conflict_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_invalid_input(fast_policy(), "create", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(invalid_input("Rule with rank 7 is not allowed at order 1"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_timeout() {
        let policy = RetryPolicy {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(50),
        };
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_invalid_input(policy, "update", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(invalid_input("busy"))
        })
        .await;

        assert!(result.unwrap_err().is_invalid_input());
        let attempts = calls.load(Ordering::SeqCst);
        assert!((2..=3).contains(&attempts), "attempts = {attempts}");
    }
}

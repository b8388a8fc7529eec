//! Capped exponential backoff for startup connections.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use cadence_types::defaults::MAX_BACKOFF_SECS;
use tracing::warn;

/// Delay after failed attempt `attempt` (numbered from 1): `min(2^attempt, 30)` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64
        .checked_pow(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// Run `f` up to `max_attempts` times, sleeping [`backoff_delay`] between
/// failures. Returns the last error once the budget is spent.
///
/// `f` receives the attempt number. A budget of zero still makes one attempt.
pub async fn retry_with_backoff<F, Fut, T, E>(label: &str, max_attempts: u32, mut f: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                let backoff = backoff_delay(attempt);
                warn!(
                    dependency = label,
                    attempt,
                    max_attempts,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_then_caps() {
        let delays: Vec<u64> = (1..=7).map(|a| backoff_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_backoff_huge_attempt_does_not_overflow() {
        assert_eq!(backoff_delay(200), Duration::from_secs(MAX_BACKOFF_SECS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result: Result<u32, String> = retry_with_backoff("db", 5, |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(format!("refused #{attempt}"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after the first failure, 4s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_with_last_error() {
        let result: Result<(), String> =
            retry_with_backoff("broker", 3, |attempt| async move { Err(format!("fail {attempt}")) })
                .await;
        assert_eq!(result, Err("fail 3".to_string()));
    }

    #[tokio::test]
    async fn test_zero_budget_still_tries_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff("db", 0, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

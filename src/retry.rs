//! Retry logic with exponential backoff
//!
//! Bounded retry for transient download failures. Every failed attempt is
//! followed by a backoff sleep of `initial_backoff * multiplier^(attempt-1)`,
//! capped at `max_backoff`, with optional jitter. Non-retryable errors
//! (HTTPS policy violations, configuration problems) return immediately
//! without consuming the budget.

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server errors, integrity
/// mismatches) should return `true`. Permanent failures (policy rejections,
/// bad configuration, store corruption) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Transport errors are retryable within the downloader's budget
            Error::Network(_) => true,
            // A non-2xx answer may be a transient server condition
            Error::HttpStatus { .. } => true,
            // Post-write verification failure counts against the same budget
            Error::IntegrityMismatch { .. } => true,
            // I/O errors are retryable for transient connection conditions
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Policy rejection must not consume the retry budget
            Error::HttpsRequired { .. } => false,
            // Feed failures abort the feed's pass, not one download
            Error::FeedUnavailable { .. } => false,
            // Filesystem and store errors are permanent for this task
            Error::Filesystem { .. } => false,
            Error::Store(_) | Error::Sqlx(_) => false,
            // Config errors are permanent
            Error::Config { .. } => false,
            // Serialization errors are permanent
            Error::Serialization(_) => false,
            // Stop was requested - do not retry
            Error::Stopped => false,
        }
    }
}

/// Execute an async operation with bounded attempts and exponential backoff.
///
/// `config.max_attempts` is the total number of attempts. A backoff sleep
/// follows every failed retryable attempt, the last one included, so the
/// delay ladder for three failures is `initial`, `2 * initial`,
/// `4 * initial` (with the default 2.0 multiplier). Returns the successful
/// result or the last error once the budget is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut delay = config.initial_backoff;
    let mut last_err = None;

    for attempt in 1..=config.max_attempts.max(1) {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!(error = %e, "operation failed with non-retryable error");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "attempt failed, backing off"
                );
                last_err = Some(e);

                let slept = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(slept).await;

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_backoff);
            }
        }
    }

    // max_attempts >= 1, so at least one Err was recorded to reach this point
    let e = last_err.unwrap_or_else(|| unreachable!("retry loop ran zero attempts"));
    tracing::error!(
        error = %e,
        attempts = config.max_attempts,
        "operation failed after all attempts exhausted"
    );
    Err(e)
}

/// Add random jitter to a delay to prevent thundering herd.
///
/// Uniformly distributed between 0% and 100% of the delay, so the actual
/// sleep lands between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_calls_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn transient_failures_then_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_makes_exactly_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "max_attempts is the total attempt count"
        );
    }

    #[tokio::test]
    async fn permanent_error_returns_without_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(5), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Permanent)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_ladder_doubles_between_attempts() {
        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts_clone = timestamps.clone();

        let _result = retry_with_backoff(&fast_config(3), || {
            let ts = ts_clone.clone();
            async move {
                ts.lock().await.push(std::time::Instant::now());
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 3);

        // Gaps should be ~10ms then ~20ms (the final 40ms sleep happens
        // after the last attempt, with no call following it)
        let gap1 = ts[1].duration_since(ts[0]);
        let gap2 = ts[2].duration_since(ts[1]);
        assert!(gap1 >= Duration::from_millis(8), "first gap was {gap1:?}");
        assert!(gap2 >= Duration::from_millis(16), "second gap was {gap2:?}");

        let ratio = gap2.as_secs_f64() / gap1.as_secs_f64();
        assert!(
            (1.4..=2.8).contains(&ratio),
            "gap2/gap1 ratio should be ~2.0, was {ratio:.2}"
        );
    }

    #[tokio::test]
    async fn backoff_is_capped_at_max() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(50),
            backoff_multiplier: 10.0,
            jitter: false,
        };

        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts_clone = timestamps.clone();

        let _result = retry_with_backoff(&config, || {
            let ts = ts_clone.clone();
            async move {
                ts.lock().await.push(std::time::Instant::now());
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 4);
        let max_allowed = Duration::from_millis(150); // cap + scheduling tolerance
        for i in 1..ts.len() {
            let gap = ts[i].duration_since(ts[i - 1]);
            assert!(gap <= max_allowed, "gap {i} was {gap:?}, exceeds the cap");
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let delay = Duration::from_millis(50);
        for i in 0..200 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay, "iteration {i}: {jittered:?} < {delay:?}");
            assert!(jittered <= delay * 2, "iteration {i}: {jittered:?} > 2x");
        }
    }

    #[test]
    fn https_required_is_not_retryable() {
        let err = Error::HttpsRequired {
            url: "http://example.com/ep.mp3".to_string(),
        };
        assert!(
            !err.is_retryable(),
            "policy rejection must not consume the retry budget"
        );
    }

    #[test]
    fn http_status_is_retryable() {
        let err = Error::HttpStatus {
            status: 503,
            url: "https://example.com/ep.mp3".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn integrity_mismatch_is_retryable() {
        let err = Error::IntegrityMismatch {
            path: "/tmp/ep.mp3".into(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn io_timeout_is_retryable_but_not_found_is_not() {
        let timeout = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"));
        assert!(timeout.is_retryable());

        let not_found = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn permanent_variants_are_not_retryable() {
        assert!(
            !Error::Config {
                message: "bad".to_string(),
                key: None,
            }
            .is_retryable()
        );
        assert!(
            !Error::FeedUnavailable {
                url: "https://example.com/feed.xml".to_string(),
                reason: "parse error".to_string(),
            }
            .is_retryable()
        );
        assert!(!Error::Stopped.is_retryable());
        assert!(
            !Error::Filesystem {
                path: "/tmp/x".into(),
                reason: "denied".to_string(),
            }
            .is_retryable()
        );
    }
}

//! Async runtime utilities.
//!
//! Everything the loop does against the generative service goes through
//! [`retry_with_backoff`]: every attempt is bounded by a timeout, failed
//! attempts back off exponentially, and the caller receives a
//! [`RetryExhausted`] instead of a panic once the budget is spent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

/// Run a future with a timeout.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError)
}

/// Timeout error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out")]
pub struct TimeoutError;

/// A handle for abandoning in-flight work.
///
/// Unlike a broadcast channel the cancelled state is sticky, so work that
/// starts after [`CancelHandle::cancel`] still observes it.
#[derive(Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create a new, not yet cancelled, handle.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.sender.subscribe();
        // The sender lives as long as `self`, so `changed` only errors after drop.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Retry budget for a fallible remote operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Timeout applied to every attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptError<E> {
    /// The attempt exceeded the policy timeout.
    #[error("attempt timed out")]
    Timeout,
    /// The operation returned an error.
    #[error("attempt failed: {0}")]
    Failed(E),
}

/// All attempts of a retried operation failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted<E: std::fmt::Display> {
    /// Number of attempts made.
    pub attempts: u32,
    /// Failure of the final attempt.
    pub last: AttemptError<E>,
}

impl<E: std::fmt::Display> RetryExhausted<E> {
    /// Whether the final attempt failed by timing out.
    pub fn timed_out(&self) -> bool {
        matches!(self.last, AttemptError::Timeout)
    }
}

/// Retry a fallible operation with a per-attempt timeout and exponential backoff.
///
/// The closure receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryExhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_when(policy, |_: &E| true, operation).await
}

/// Like [`retry_with_backoff`], but gives up at once on errors `retryable` rejects.
///
/// Timeouts are always retried.
pub async fn retry_with_backoff_when<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    retryable: P,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match with_timeout(policy.attempt_timeout, operation(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(TimeoutError) => AttemptError::Timeout,
        };

        let permanent = matches!(&error, AttemptError::Failed(e) if !retryable(e));
        if permanent || attempt >= max_attempts {
            return Err(RetryExhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.backoff_for(attempt);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Run futures concurrently with at most `limit` in flight, preserving input order.
pub async fn run_bounded<I, F, T>(limit: usize, futures: I) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let guarded = futures.into_iter().map(|future| {
        let semaphore = semaphore.clone();
        async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = semaphore.acquire_owned().await.ok();
            future.await
        }
    });
    futures::future::join_all(guarded).await
}

/// Sleep for a duration.
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            sleep(Duration::from_secs(1)).await;
            42
        })
        .await;
        assert_eq!(result, Err(TimeoutError));
    }

    #[tokio::test]
    async fn test_cancel_handle_is_sticky() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());

        tokio::spawn({
            let handle = handle.clone();
            async move {
                sleep(Duration::from_millis(10)).await;
                handle.cancel();
            }
        });

        handle.cancelled().await;
        assert!(handle.is_cancelled());
        // A late waiter resolves immediately.
        handle.clone().cancelled().await;
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = retry_with_backoff(&policy, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(format!("failure {}", attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_reports_last_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };

        let result: Result<(), _> =
            retry_with_backoff(&policy, |_| async { Err::<(), _>("nope".to_string()) }).await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.last, AttemptError::Failed("nope".to_string()));
        assert!(!err.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff_when(
            &RetryPolicy::default(),
            |e: &String| e != "fatal",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("fatal".to_string()) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_times_out_each_attempt() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(50),
        };

        let result: Result<u32, RetryExhausted<String>> = retry_with_backoff(&policy, |_| async {
            sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;

        assert!(result.unwrap_err().timed_out());
    }

    #[tokio::test]
    async fn test_run_bounded_limits_concurrency_and_keeps_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..8)
            .map(|i| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            })
            .collect();

        let results = run_bounded(2, futures).await;
        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_run_bounded_zero_limit_still_runs() {
        let results = run_bounded(0, vec![std::future::ready(1), std::future::ready(2)]).await;
        assert_eq!(results, vec![1, 2]);
    }
}

//! Bounded retries with exponential backoff and a total deadline.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryConfig;
use crate::core::TaskError;

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<O> {
    /// Final result: the first success, or the error that ended the sequence.
    pub result: Result<O, TaskError>,
    /// Attempts actually started.
    pub attempts: u32,
}

/// Retry policy: at most `max_attempts` tries, exponential backoff between
/// them, and an optional wall-clock budget across the whole sequence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Build from configuration.
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_factor: config.backoff_factor.max(1.0),
            deadline: config.per_task_deadline,
        }
    }

    /// A policy that runs exactly once with no deadline.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
            deadline: None,
        }
    }

    /// Maximum attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Default total deadline.
    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Backoff before `attempt` (1-based). The first attempt starts
    /// immediately; the first retry waits `initial_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `op` under this policy using the policy's own deadline.
    pub async fn execute<O, F, Fut>(&self, op: F) -> RetryOutcome<O>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<O, TaskError>>,
    {
        self.execute_with_deadline(self.deadline, op).await
    }

    /// Run `op` under this policy with an explicit total deadline.
    ///
    /// `op` receives the 1-based attempt number. Only retryable errors start
    /// another attempt. Each attempt runs under the remaining budget; when the
    /// budget cannot cover the next backoff, the sequence stops with
    /// [`TaskError::Timeout`] instead of starting another attempt.
    pub async fn execute_with_deadline<O, F, Fut>(
        &self,
        deadline: Option<Duration>,
        op: F,
    ) -> RetryOutcome<O>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<O, TaskError>>,
    {
        self.execute_cancellable(deadline, &CancellationToken::new(), op)
            .await
    }

    /// Like [`execute_with_deadline`](Self::execute_with_deadline), but stops
    /// retrying once `cancel` fires.
    ///
    /// A running attempt is never interrupted. Cancellation is checked before
    /// each retry and ends any backoff in progress; the sequence then stops
    /// with [`TaskError::Cancelled`].
    pub async fn execute_cancellable<O, F, Fut>(
        &self,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
        mut op: F,
    ) -> RetryOutcome<O>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<O, TaskError>>,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            if attempt > 1 {
                if cancel.is_cancelled() {
                    debug!(attempt = attempt, "cancelled before retry");
                    return RetryOutcome {
                        result: Err(TaskError::Cancelled),
                        attempts: attempt - 1,
                    };
                }
                let delay = self.delay_for_attempt(attempt);
                if let Some(limit) = deadline {
                    if started.elapsed() + delay >= limit {
                        debug!(attempt = attempt, "retry budget exhausted before backoff");
                        return RetryOutcome {
                            result: Err(TaskError::Timeout(limit)),
                            attempts: attempt - 1,
                        };
                    }
                }
                if !delay.is_zero() {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            debug!(attempt = attempt, "cancelled during backoff");
                            return RetryOutcome {
                                result: Err(TaskError::Cancelled),
                                attempts: attempt - 1,
                            };
                        }
                    }
                }
            }

            let result = match deadline {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return RetryOutcome {
                            result: Err(TaskError::Timeout(limit)),
                            attempts: attempt - 1,
                        };
                    }
                    match tokio::time::timeout(remaining, op(attempt)).await {
                        Ok(result) => result,
                        Err(_) => Err(TaskError::Timeout(limit)),
                    }
                }
                None => op(attempt).await,
            };

            match result {
                Ok(output) => {
                    return RetryOutcome {
                        result: Ok(output),
                        attempts: attempt,
                    }
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    debug!(attempt = attempt, error = %err, "attempt failed, retrying");
                }
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(max_attempts: u32, initial_ms: u64, max_ms: u64, factor: f64) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_factor: factor,
            per_task_deadline: None,
        })
    }

    #[test]
    fn test_delay_schedule() {
        let policy = policy(6, 10, 50, 2.0);
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let policy = policy(5, 1, 5, 2.0);
        let calls = AtomicU32::new(0);
        let outcome = policy
            .execute(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TaskError::transient("not yet"))
                    } else {
                        Ok(attempt * 10)
                    }
                }
            })
            .await;
        assert_eq!(outcome.result, Ok(30));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_never_exceeds_max_attempts() {
        let policy = policy(4, 1, 2, 2.0);
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TaskError::transient("always")) }
            })
            .await;
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.result, Err(TaskError::transient("always")));
    }

    #[tokio::test]
    async fn test_permanent_error_fails_first_attempt() {
        let policy = policy(5, 1, 5, 2.0);
        let outcome: RetryOutcome<()> = policy
            .execute(|_| async { Err(TaskError::permanent("bad input")) })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_deadline_stops_before_next_attempt() {
        let policy = policy(10, 40, 40, 1.0);
        let started = Instant::now();
        let outcome: RetryOutcome<()> = policy
            .execute_with_deadline(Some(Duration::from_millis(100)), |_| async {
                Err(TaskError::transient("flaky"))
            })
            .await;
        assert_eq!(
            outcome.result,
            Err(TaskError::Timeout(Duration::from_millis(100)))
        );
        // Attempts start at ~0ms, ~40ms, ~80ms; the next backoff would cross
        // 100ms. Slow schedulers may lose the third one.
        assert!((2..=3).contains(&outcome.attempts));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_deadline_bounds_slow_attempt() {
        let policy = policy(3, 1, 1, 1.0);
        let started = Instant::now();
        let outcome: RetryOutcome<()> = policy
            .execute_with_deadline(Some(Duration::from_millis(50)), |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(outcome.result, Err(TaskError::Timeout(Duration::from_millis(50))));
        assert_eq!(outcome.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancel_stops_backoff() {
        let policy = policy(5, 5_000, 5_000, 1.0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let started = Instant::now();
        let outcome: RetryOutcome<()> = policy
            .execute_cancellable(None, &cancel, |_| {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Err(TaskError::transient("flaky"))
                }
            })
            .await;
        assert_eq!(outcome.result, Err(TaskError::Cancelled));
        assert_eq!(outcome.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancel_does_not_discard_success() {
        let policy = policy(3, 1, 1, 1.0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = policy
            .execute_cancellable(None, &cancel, |attempt| async move { Ok(attempt) })
            .await;
        assert_eq!(outcome.result, Ok(1));
    }

    #[tokio::test]
    async fn test_pure_function_is_stable_across_retries() {
        let policy = policy(3, 1, 1, 1.0);
        let input = 21_u64;
        let outcome = policy
            .execute(|attempt| async move {
                if attempt == 1 {
                    Err(TaskError::transient("warming up"))
                } else {
                    Ok(input * 2)
                }
            })
            .await;
        assert_eq!(outcome.result, Ok(42));
    }
}

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal(E),
    /// The error was retryable, but the configured retries were exhausted.
    AttemptsExceeded(E),
}

/// Exponential backoff: retry `n` (zero-based) waits
/// `base_delay * multiplier^n`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_serializable_conflicts()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: multiplier.max(1),
            max_delay: Duration::from_secs(300),
        }
    }

    /// Waits 1s, 3s, 9s and 27s before giving up.
    pub fn for_serializable_conflicts() -> Self {
        Self::new(4, Duration::from_secs(1), 3)
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Executes the operation with the configured retry policy. `op`
    /// receives the number of retries consumed so far.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut retries = 0;

        loop {
            match op(retries).await {
                Ok(result) => return Ok(result),
                Err(err) => match classify(&err) {
                    RetryDisposition::Stop => return Err(RetryError::Fatal(err)),
                    RetryDisposition::Retry => {
                        if retries >= self.max_retries {
                            return Err(RetryError::AttemptsExceeded(err));
                        }

                        let delay = self.delay_for(retries);
                        warn!(
                            retries,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying after transient failure"
                        );
                        sleep(delay).await;
                        retries += 1;
                    }
                },
            }
        }
    }

    pub fn delay_for(&self, retry: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::time::Instant;

    #[test]
    fn test_conflict_schedule() {
        let policy = RetryPolicy::for_serializable_conflicts();
        let delays: Vec<u64> = (0..4).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 3, 9, 27]);
        assert_eq!(
            policy.clone().with_max_delay(Duration::from_secs(5)).delay_for(3),
            Duration::from_secs(5)
        );
        assert_eq!(RetryPolicy::none().delay_for(2), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up_after_max_retries() {
        let policy = RetryPolicy::for_serializable_conflicts();
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let result: Result<(), RetryError<&str>> = policy
            .run(
                |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("conflict")
                    }
                },
                |_| RetryDisposition::Retry,
            )
            .await;

        assert!(matches!(result, Err(RetryError::AttemptsExceeded("conflict"))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(1 + 3 + 9 + 27));
        assert!(waited < Duration::from_secs(41));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_fatal_and_reports_retry_count() {
        let policy = RetryPolicy::for_serializable_conflicts();
        let seen = Arc::new(AtomicUsize::new(0));

        let result: Result<(), RetryError<usize>> = policy
            .run(
                |retries| {
                    let seen = seen.clone();
                    async move {
                        seen.store(retries, Ordering::SeqCst);
                        Err(retries)
                    }
                },
                |retries| {
                    if *retries < 2 {
                        RetryDisposition::Retry
                    } else {
                        RetryDisposition::Stop
                    }
                },
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(2))));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}

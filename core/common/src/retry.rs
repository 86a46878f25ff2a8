// core/common/src/retry.rs
// Bounded retry with exponential backoff

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Classification used when no explicit predicate is given.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Something that can block for a given duration.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread for real.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays without sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn total(&self) -> Duration {
        self.delays().into_iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        match self.delays.lock() {
            Ok(mut delays) => delays.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed): `unit * 2^(attempt-1)`.
    /// Saturates at `Duration::MAX`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let unit = self.backoff_unit.as_nanos();
        if unit == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1);
        1u128
            .checked_shl(exponent)
            .and_then(|factor| unit.checked_mul(factor))
            .and_then(|nanos| {
                let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
                Some(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
            })
            .unwrap_or(Duration::MAX)
    }

    /// Sum of the delays taken before attempt `attempts + 1`.
    pub fn total_backoff(&self, attempts: u32) -> Duration {
        (1..=attempts).fold(Duration::ZERO, |acc, i| acc.saturating_add(self.backoff(i)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

/// A retry policy bound to a way of waiting between attempts.
#[derive(Debug, Clone)]
pub struct Retrier<S = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
}

impl Retrier<ThreadSleeper> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: ThreadSleeper,
        }
    }
}

impl<S: Sleeper> Retrier<S> {
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invokes `operation` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempt budget runs out. Errors come back unchanged.
    pub fn run<T, E, F, P>(&self, is_retryable: P, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.effective_max_attempts();
        let mut attempt = 1;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    self.sleeper.sleep(self.policy.backoff(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn run_retryable<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Retryable,
    {
        self.run(E::is_retryable, operation)
    }
}

/// Retries `operation` with one-second exponential backoff, blocking the thread.
pub fn retry<T, E, F, P>(max_attempts: u32, is_retryable: P, operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    Retrier::new(RetryPolicy::with_max_attempts(max_attempts)).run(is_retryable, operation)
}

/// Async counterpart of [`Retrier::run_retryable`]; suspends the task between attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_attempts: u32,
    initial_delay_ms: u64,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let policy = RetryPolicy::new(max_attempts, Duration::from_millis(initial_delay_ms));
    let max_attempts = policy.effective_max_attempts();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && err.is_retryable() => {
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

//! Bounded retry with linear backoff.

use std::time::Duration;

use crate::{DoubaoError, Result};

/// Blocking pause between attempts.
pub trait Sleep {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return the current outcome to the caller.
    Stop,
    /// Try again after the given delay.
    RetryAfter(Duration),
}

/// Linear backoff: the delay before attempt `i + 1` is `base_delay * (i + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero still makes one attempt.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay after the failed attempt at 0-based `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// `attempt` is 0-based.
    pub fn decide(&self, attempt: u32, err: &DoubaoError) -> RetryDecision {
        if !err.is_transient() || attempt.saturating_add(1) >= self.max_attempts {
            return RetryDecision::Stop;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }

    /// Runs `f` until it succeeds, fails terminally, or attempts run out.
    ///
    /// Exhaustion returns the last attempt's own error unchanged.
    pub fn run<T, S, F>(&self, sleeper: &S, mut f: F) -> Result<T>
    where
        S: Sleep + ?Sized,
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 0u32;
        loop {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "request attempt {}/{}",
                attempt + 1,
                self.max_attempts.max(1)
            );

            let err = match f(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.decide(attempt, &err) {
                RetryDecision::Stop => {
                    #[cfg(feature = "tracing")]
                    if err.is_transient() {
                        tracing::warn!("giving up after {} attempts: {}", attempt + 1, err);
                    }
                    return Err(err);
                }
                RetryDecision::RetryAfter(delay) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("request failed ({}), retrying after {:?}", err, delay);

                    sleeper.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

// src/install/retry.rs

//! Bounded retry with linearly growing delays
//!
//! Each retry waits one `step` longer than the previous one (10s, 20s,
//! 30s, ...). The total time spent sleeping never exceeds `budget`; the
//! last delay is shortened to whatever budget remains.

use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

/// Delay growth per retry
pub const DEFAULT_RETRY_STEP: Duration = Duration::from_secs(10);

/// Total sleep budget across all retries (5 minutes)
pub const DEFAULT_RETRY_BUDGET: Duration = Duration::from_secs(300);

/// Something that can block the current thread for a duration
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Sleeper backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The operation kept failing until the budget ran out
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub step: Duration,
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step: DEFAULT_RETRY_STEP,
            budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl RetryPolicy {
    pub fn new(step: Duration, budget: Duration) -> Self {
        Self { step, budget }
    }

    /// Policy that runs the operation exactly once
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Run `op` until it succeeds or the sleep budget is spent
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, sleeper: &impl Sleeper, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        let mut slept = Duration::ZERO;
        let mut next_delay = self.step;

        loop {
            let error = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let remaining = self.budget.saturating_sub(slept);
            if self.step.is_zero() || remaining.is_zero() {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = next_delay.min(remaining);
            warn!(
                "Attempt {} failed: {}, retrying in {} seconds",
                attempt,
                error,
                delay.as_secs()
            );

            sleeper.sleep(delay);
            slept += delay;
            next_delay += self.step;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    #[test]
    fn test_success_on_first_attempt_never_sleeps() {
        let sleeper = RecordingSleeper::default();
        let result: Result<u32, RetryExhausted<String>> =
            RetryPolicy::default().run(&sleeper, |attempt| Ok(attempt));

        assert_eq!(result.unwrap(), 1);
        assert!(sleeper.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_success_after_retries() {
        let sleeper = RecordingSleeper::default();
        let result = RetryPolicy::default().run(&sleeper, |attempt| {
            if attempt < 3 {
                Err(format!("busy ({})", attempt))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            *sleeper.sleeps.borrow(),
            vec![Duration::from_secs(10), Duration::from_secs(20)]
        );
    }

    #[test]
    fn test_budget_caps_total_sleep() {
        let sleeper = RecordingSleeper::default();
        let result: Result<(), _> =
            RetryPolicy::default().run(&sleeper, |_| Err("device busy".to_string()));

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 9);
        assert_eq!(exhausted.last_error, "device busy");

        let sleeps: Vec<u64> = sleeper.sleeps.borrow().iter().map(|d| d.as_secs()).collect();
        assert_eq!(sleeps, vec![10, 20, 30, 40, 50, 60, 70, 20]);
        assert_eq!(sleeps.iter().sum::<u64>(), 300);
    }

    #[test]
    fn test_no_retry_policy() {
        let sleeper = RecordingSleeper::default();
        let result: Result<(), _> = RetryPolicy::no_retry().run(&sleeper, |_| Err("nope".to_string()));

        assert_eq!(result.unwrap_err().attempts, 1);
        assert!(sleeper.sleeps.borrow().is_empty());
    }
}

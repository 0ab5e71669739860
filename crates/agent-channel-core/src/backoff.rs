//! Exponential backoff schedule for connecting to the agent
//!
//! A failed connect is retried up to [`CONNECT_RETRIES_MAX`] times. The wait
//! before each retry starts at [`INITIAL_RETRY_WAIT`] and doubles:
//! 500ms, 1000ms, 2000ms, 4000ms, 8000ms (15.5s in total).

use std::time::Duration;

/// Maximum number of connect retries after the first attempt.
pub const CONNECT_RETRIES_MAX: u32 = 5;

/// Wait before the first retry.
pub const INITIAL_RETRY_WAIT: Duration = Duration::from_millis(500);

/// Iterator over the waits between connect attempts.
///
/// Yields one [`Duration`] per permitted retry and `None` once the retry
/// budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    next_wait: Duration,
    retries: u32,
    max_retries: u32,
}

impl Backoff {
    pub fn new(initial_wait: Duration, max_retries: u32) -> Self {
        Self {
            next_wait: initial_wait,
            retries: 0,
            max_retries,
        }
    }

    /// Number of retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Sum of every wait in the schedule, i.e. the worst-case blocking time.
    pub fn total_wait(&self) -> Duration {
        self.clone().sum()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_RETRY_WAIT, CONNECT_RETRIES_MAX)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        self.retries += 1;
        let wait = self.next_wait;
        self.next_wait = wait.saturating_mul(2);
        Some(wait)
    }
}

/// Blocks the caller between connect attempts.
///
/// The blocking [`AgentChannel::connect`](crate::AgentChannel::connect) uses
/// [`ThreadSleeper`]; tests substitute a recorder.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let waits: Vec<u64> = Backoff::default().map(|d| d.as_millis() as u64).collect();
        assert_eq!(waits, vec![500, 1000, 2000, 4000, 8000]);
    }

    #[test]
    fn test_total_wait() {
        assert_eq!(Backoff::default().total_wait(), Duration::from_millis(15_500));
    }

    #[test]
    fn test_exhausted_stays_exhausted() {
        let mut backoff = Backoff::new(Duration::from_millis(10), 1);
        assert_eq!(backoff.next(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next(), None);
        assert_eq!(backoff.next(), None);
        assert_eq!(backoff.retries(), 1);
    }

    #[test]
    fn test_zero_retries() {
        let mut backoff = Backoff::new(INITIAL_RETRY_WAIT, 0);
        assert_eq!(backoff.next(), None);
        assert_eq!(backoff.total_wait(), Duration::ZERO);
    }
}

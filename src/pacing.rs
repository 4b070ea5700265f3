//! Waiting between polls.

use std::time::Duration;

/// Something able to suspend the client loop. Tests substitute a recording one.
pub trait Sleeper {
    /// Block for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Real sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Poll delay that doubles for every consecutive unreachable poll, up to `cap`.
///
/// A cap lower than the base delay disables the backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Backoff {
    /// A backoff starting at `base`.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Backoff {
            base,
            cap,
            failures: 0,
        }
    }

    /// Delay to wait before the next poll.
    pub fn delay(&self) -> Duration {
        if self.cap <= self.base {
            return self.base;
        }
        let factor = 1u32.checked_shl(self.failures.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// Record the outcome of a poll.
    pub fn record(&mut self, reached_host: bool) {
        if reached_host {
            self.failures = 0;
        } else {
            self.failures = self.failures.saturating_add(1);
        }
    }
}

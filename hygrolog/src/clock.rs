//! Wall-clock source and the "real time" validity rule.
//!
//! Before network time synchronization the system clock reports something
//! close to the Unix epoch. Any timestamp at or below
//! [`REAL_TIME_THRESHOLD`] is treated as unsynchronized, and every operation
//! whose correctness depends on a meaningful time (appending, pruning,
//! computing a default query window) is skipped rather than run with it.

use std::cell::Cell;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Seconds since epoch known to be after the device was built (2023-11-14).
pub const REAL_TIME_THRESHOLD: i64 = 1_700_000_000;

/// Returns `true` if `timestamp` is plausibly a synchronized wall-clock time.
pub fn is_real(timestamp: i64) -> bool {
    timestamp > REAL_TIME_THRESHOLD
}

/// A source of UTC wall-clock time in whole seconds since the Unix epoch.
pub trait Clock {
    /// Returns the current time in seconds since epoch.
    fn now_utc(&self) -> i64;

    /// Returns `true` if the clock currently reports a real time.
    fn is_real(&self) -> bool {
        is_real(self.now_utc())
    }
}

/// The operating system's clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
            // Clock set before 1970: definitely not synchronized.
            Err(_) => 0,
        }
    }
}

/// A clock that reports whatever it was last set to.
///
/// Lets tests and offline tools pin "now" to a fixed value.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    /// Creates a clock fixed at `now`.
    pub fn new(now: i64) -> Self {
        Self { now: Cell::new(now) }
    }

    /// Sets the reported time.
    pub fn set(&self, now: i64) {
        self.now.set(now);
    }

    /// Moves the reported time forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.set(self.now.get().saturating_add(secs));
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> i64 {
        self.now.get()
    }
}

/// Polls `clock` until it reports a real time or `timeout` elapses.
///
/// Returns whether the clock became real. Blocks the calling thread.
pub fn wait_for_real_clock<C: Clock + ?Sized>(clock: &C, timeout: Duration, poll: Duration) -> bool {
    let start = Instant::now();
    loop {
        if clock.is_real() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!is_real(0));
        assert!(!is_real(REAL_TIME_THRESHOLD));
        assert!(is_real(REAL_TIME_THRESHOLD + 1));
    }

    #[test]
    fn test_system_clock_is_real() {
        assert!(SystemClock.is_real());
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now_utc(), 10);
        assert!(!clock.is_real());

        clock.set(1_700_000_100);
        assert!(clock.is_real());

        clock.advance(3600);
        assert_eq!(clock.now_utc(), 1_700_003_700);
    }

    #[test]
    fn test_wait_for_real_clock_times_out() {
        let clock = ManualClock::new(0);
        let synced = wait_for_real_clock(&clock, Duration::from_millis(20), Duration::from_millis(5));
        assert!(!synced);
    }

    #[test]
    fn test_wait_for_real_clock_returns_immediately_when_synced() {
        let clock = ManualClock::new(1_700_000_100);
        let start = Instant::now();
        assert!(wait_for_real_clock(&clock, Duration::from_secs(5), Duration::from_secs(1)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

//! Wall-clock abstraction.
//!
//! Both the registry and the stats engine stamp events with the current time.
//! Production code injects [`SystemClock`]; tests inject a [`ManualClock`] so
//! creation/deletion/reset timestamps are deterministic.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in nanoseconds since the Unix epoch.
    fn now_ns(&self) -> i64;

    /// Current time in whole seconds since the Unix epoch.
    fn now_sec(&self) -> i64 {
        self.now_ns() / NANOS_PER_SEC
    }
}

/// Clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)] // i64 nanos cover until year 2262
    fn now_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `sec` seconds since the epoch.
    pub fn at_sec(sec: i64) -> Self {
        Self {
            now_ns: AtomicI64::new(sec * NANOS_PER_SEC),
        }
    }

    /// Moves the clock to `sec` seconds since the epoch.
    pub fn set_sec(&self, sec: i64) {
        self.now_ns.store(sec * NANOS_PER_SEC, Ordering::SeqCst);
    }

    /// Advances the clock by `secs` seconds.
    pub fn advance_sec(&self, secs: i64) {
        self.now_ns.fetch_add(secs * NANOS_PER_SEC, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> i64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::at_sec(100);
        assert_eq!(clock.now_sec(), 100);
        assert_eq!(clock.now_ns(), 100 * NANOS_PER_SEC);

        clock.advance_sec(5);
        assert_eq!(clock.now_sec(), 105);

        clock.set_sec(7);
        assert_eq!(clock.now_sec(), 7);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_sec() > 1_577_836_800);
    }
}

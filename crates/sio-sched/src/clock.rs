//! Monotonic time source for deadline tracking.
//!
//! Deadlines are plain tick counts compared against the current tick. The
//! scheduler never schedules callbacks; the host passes `now` into every
//! operation that needs it.

use std::cell::Cell;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Default tick rate: one tick per millisecond.
pub const DEFAULT_TICK_HZ: u64 = 1000;

/// A point on the monotonic clock, in ticks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The origin of the clock.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from a raw tick count.
    #[inline]
    pub fn from_ticks(ticks: u64) -> Self {
        Timestamp(ticks)
    }

    /// Returns the raw tick count.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.0
    }

    /// Adds a duration in ticks, clamping at the end of the clock.
    #[inline]
    pub fn saturating_add(self, ticks: u64) -> Self {
        Timestamp(self.0.saturating_add(ticks))
    }

    /// Returns true if `self` is strictly later than `other`.
    #[inline]
    pub fn is_after(&self, other: Timestamp) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}", self.0)
    }
}

/// Source of monotonic timestamps.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;

    /// Returns the number of ticks per second.
    fn hz(&self) -> u64;
}

/// Wall-independent clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    hz: u64,
}

impl MonotonicClock {
    /// Creates a clock ticking `hz` times per second, starting at zero.
    pub fn new(hz: u64) -> Self {
        Self {
            origin: Instant::now(),
            hz: hz.max(1),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_HZ)
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let nanos = self.origin.elapsed().as_nanos();
        let ticks = nanos.saturating_mul(self.hz as u128) / 1_000_000_000;
        Timestamp(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    fn hz(&self) -> u64 {
        self.hz
    }
}

/// Manually driven clock for tests and trace replay.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<u64>,
    hz: u64,
}

impl ManualClock {
    /// Creates a manual clock at tick zero.
    pub fn new(hz: u64) -> Self {
        Self {
            now: Cell::new(0),
            hz: hz.max(1),
        }
    }

    /// Moves the clock forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get().saturating_add(ticks));
    }

    /// Jumps to `at`. Moving backwards is ignored.
    pub fn set(&self, at: Timestamp) {
        if at.0 > self.now.get() {
            self.now.set(at.0);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_HZ)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.get())
    }

    fn hz(&self) -> u64 {
        self.hz
    }
}

/// Converts milliseconds to ticks, rounding up and saturating.
pub fn ms_to_ticks(ms: u64, hz: u64) -> u64 {
    let ticks = (ms as u128 * hz as u128).div_ceil(1000);
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

/// Converts ticks to milliseconds, rounding down.
pub fn ticks_to_ms(ticks: u64, hz: u64) -> u64 {
    let ms = ticks as u128 * 1000 / hz.max(1) as u128;
    u64::try_from(ms).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_add_clamps() {
        let t = Timestamp(u64::MAX - 1);
        assert_eq!(t.saturating_add(10), Timestamp(u64::MAX));
    }

    #[test]
    fn test_is_after_is_strict() {
        assert!(Timestamp(5).is_after(Timestamp(4)));
        assert!(!Timestamp(5).is_after(Timestamp(5)));
        assert!(!Timestamp(4).is_after(Timestamp(5)));
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now(), Timestamp::ZERO);
        clock.advance(250);
        assert_eq!(clock.now(), Timestamp(250));
        clock.set(Timestamp(100));
        assert_eq!(clock.now(), Timestamp(250));
        clock.set(Timestamp(900));
        assert_eq!(clock.now(), Timestamp(900));
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::default();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert_eq!(clock.hz(), DEFAULT_TICK_HZ);
    }

    #[test]
    fn test_ms_ticks_conversion() {
        assert_eq!(ms_to_ticks(500, 1000), 500);
        assert_eq!(ms_to_ticks(500, 250), 125);
        // 1ms at 100Hz rounds up to a whole tick
        assert_eq!(ms_to_ticks(1, 100), 1);
        assert_eq!(ms_to_ticks(0, 100), 0);
        assert_eq!(ticks_to_ms(125, 250), 500);
        assert_eq!(ticks_to_ms(1, 100), 10);
        assert_eq!(ms_to_ticks(u64::MAX, 1000), u64::MAX);
    }
}

//! Write starvation tracking.

use crate::config::Tunables;
use crate::request::Direction;

/// Counts consecutive read dispatches since the last write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StarvationGuard {
    starved: u64,
}

impl StarvationGuard {
    /// Creates a guard with a zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the count for a request just dispatched in `direction`.
    #[inline]
    pub fn record_dispatch(&mut self, direction: Direction) {
        match direction {
            Direction::Write => self.starved = 0,
            Direction::Read => self.starved = self.starved.saturating_add(1),
        }
    }

    /// Returns true once reads have starved writes past the limit.
    #[inline]
    pub fn should_force_writes(&self, tunables: &Tunables) -> bool {
        self.starved > tunables.writes_starved()
    }

    /// Current number of consecutive read dispatches.
    #[inline]
    pub fn starved_count(&self) -> u64 {
        self.starved
    }
}

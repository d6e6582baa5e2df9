//! Scheduler configuration and runtime tunables.
//!
//! [`SchedulerConfig`] is the file-facing form, expressed in milliseconds.
//! [`Tunables`] is what a running scheduler consults, expressed in clock
//! ticks. Expiry tunables are read and written in milliseconds and stored
//! in ticks; the counts (`fifo_batch`, `writes_starved`) are stored as-is.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{ms_to_ticks, ticks_to_ms, DEFAULT_TICK_HZ};
use crate::error::{SchedError, SchedResult};
use crate::request::{Direction, RequestClass};

/// Largest value any tunable accepts.
pub const MAX_TUNABLE: u64 = i32::MAX as u64;

/// Scheduler configuration in human units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Clock ticks per second.
    pub tick_hz: u64,
    /// Max time before a sync read is dispatched, in milliseconds.
    pub sync_read_expire_ms: u64,
    /// Max time before a sync write is dispatched, in milliseconds.
    pub sync_write_expire_ms: u64,
    /// Max time before an async read is dispatched, in milliseconds.
    pub async_read_expire_ms: u64,
    /// Max time before an async write is dispatched, in milliseconds.
    pub async_write_expire_ms: u64,
    /// Dispatches per batch between expiry checks.
    pub fifo_batch: u64,
    /// Max consecutive read dispatches before writes are considered first.
    pub writes_starved: u64,
    /// Request slots reserved when the scheduler is initialized.
    pub initial_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_hz: DEFAULT_TICK_HZ,
            sync_read_expire_ms: 500,
            sync_write_expire_ms: 2_000,
            async_read_expire_ms: 4_000,
            async_write_expire_ms: 16_000,
            fifo_batch: 1,
            writes_starved: 4,
            initial_capacity: 128,
        }
    }
}

impl SchedulerConfig {
    /// Loads a configuration from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> SchedResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SchedError::InvalidConfig {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| SchedError::InvalidConfig {
                reason: e.to_string(),
            }),
            "json" => serde_json::from_str(&contents).map_err(|e| SchedError::InvalidConfig {
                reason: e.to_string(),
            }),
            _ => Err(SchedError::InvalidConfig {
                reason: format!("unsupported config file extension: {:?}", ext),
            }),
        }
    }

    /// Validates every field and converts to tick-based tunables.
    pub fn to_tunables(&self) -> SchedResult<Tunables> {
        if self.tick_hz == 0 {
            return Err(SchedError::InvalidConfig {
                reason: "tick_hz must be non-zero".to_string(),
            });
        }

        let mut tunables = Tunables::zeroed(self.tick_hz);
        tunables.set(Tunable::SyncReadExpire, self.sync_read_expire_ms)?;
        tunables.set(Tunable::SyncWriteExpire, self.sync_write_expire_ms)?;
        tunables.set(Tunable::AsyncReadExpire, self.async_read_expire_ms)?;
        tunables.set(Tunable::AsyncWriteExpire, self.async_write_expire_ms)?;
        tunables.set(Tunable::FifoBatch, self.fifo_batch)?;
        tunables.set(Tunable::WritesStarved, self.writes_starved)?;
        Ok(tunables)
    }
}

/// Names of the runtime tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tunable {
    /// Sync read expiry, milliseconds.
    SyncReadExpire,
    /// Sync write expiry, milliseconds.
    SyncWriteExpire,
    /// Async read expiry, milliseconds.
    AsyncReadExpire,
    /// Async write expiry, milliseconds.
    AsyncWriteExpire,
    /// Dispatches per batch.
    FifoBatch,
    /// Read dispatches tolerated before writes are forced.
    WritesStarved,
}

impl Tunable {
    /// Every tunable, in listing order.
    pub const ALL: [Tunable; 6] = [
        Tunable::SyncReadExpire,
        Tunable::SyncWriteExpire,
        Tunable::AsyncReadExpire,
        Tunable::AsyncWriteExpire,
        Tunable::FifoBatch,
        Tunable::WritesStarved,
    ];

    /// Returns the attribute name.
    pub fn name(&self) -> &'static str {
        match self {
            Tunable::SyncReadExpire => "sync_read_expire",
            Tunable::SyncWriteExpire => "sync_write_expire",
            Tunable::AsyncReadExpire => "async_read_expire",
            Tunable::AsyncWriteExpire => "async_write_expire",
            Tunable::FifoBatch => "fifo_batch",
            Tunable::WritesStarved => "writes_starved",
        }
    }

    /// Returns the class an expiry tunable applies to.
    pub fn expiry_class(&self) -> Option<RequestClass> {
        match self {
            Tunable::SyncReadExpire => Some(RequestClass::SYNC_READ),
            Tunable::SyncWriteExpire => Some(RequestClass::SYNC_WRITE),
            Tunable::AsyncReadExpire => Some(RequestClass::ASYNC_READ),
            Tunable::AsyncWriteExpire => Some(RequestClass::ASYNC_WRITE),
            Tunable::FifoBatch | Tunable::WritesStarved => None,
        }
    }
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tunable {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tunable::ALL
            .into_iter()
            .find(|t| t.name() == s.trim())
            .ok_or_else(|| SchedError::UnknownTunable(s.to_string()))
    }
}

/// Tunables held by a running scheduler, in clock ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    hz: u64,
    /// Expiry per class, indexed `[sync][direction]`.
    expire: [[u64; 2]; 2],
    fifo_batch: u64,
    writes_starved: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        let hz = DEFAULT_TICK_HZ;
        Self {
            hz,
            expire: [
                [ms_to_ticks(4_000, hz), ms_to_ticks(16_000, hz)],
                [ms_to_ticks(500, hz), ms_to_ticks(2_000, hz)],
            ],
            fifo_batch: 1,
            writes_starved: 4,
        }
    }
}

impl Tunables {
    fn zeroed(hz: u64) -> Self {
        Self {
            hz,
            expire: [[0; 2]; 2],
            fifo_batch: 0,
            writes_starved: 0,
        }
    }

    /// Clock ticks per second these tunables were converted with.
    #[inline]
    pub fn hz(&self) -> u64 {
        self.hz
    }

    /// Expiry duration for a class, in ticks.
    #[inline]
    pub fn expiry(&self, sync: bool, direction: Direction) -> u64 {
        self.expire[sync as usize][direction.as_index()]
    }

    /// Dispatches per batch between expiry checks.
    #[inline]
    pub fn fifo_batch(&self) -> u64 {
        self.fifo_batch
    }

    /// Read dispatches tolerated before writes are forced.
    #[inline]
    pub fn writes_starved(&self) -> u64 {
        self.writes_starved
    }

    /// Reads a tunable in its external unit.
    pub fn get(&self, tunable: Tunable) -> u64 {
        match tunable.expiry_class() {
            Some(class) => ticks_to_ms(self.expiry(class.sync, class.direction), self.hz),
            None if tunable == Tunable::FifoBatch => self.fifo_batch,
            None => self.writes_starved,
        }
    }

    /// Writes a tunable given in its external unit.
    ///
    /// Values above [`MAX_TUNABLE`] are rejected and the prior value kept.
    pub fn set(&mut self, tunable: Tunable, value: u64) -> SchedResult<()> {
        if value > MAX_TUNABLE {
            return Err(SchedError::ConfigOutOfRange {
                tunable,
                value: value as i128,
                max: MAX_TUNABLE,
            });
        }

        match tunable.expiry_class() {
            Some(class) => {
                self.expire[class.sync as usize][class.direction.as_index()] =
                    ms_to_ticks(value, self.hz);
            }
            None if tunable == Tunable::FifoBatch => self.fifo_batch = value,
            None => self.writes_starved = value,
        }

        debug!("Tunable {} set to {}", tunable, value);
        Ok(())
    }

    /// Parses `input` as a decimal value and writes it to `tunable`.
    ///
    /// Text that is not a decimal integer is `InvalidValue`; any number
    /// outside `[0, MAX_TUNABLE]`, negative or huge, is `ConfigOutOfRange`.
    pub fn store(&mut self, tunable: Tunable, input: &str) -> SchedResult<()> {
        let text = input.trim();
        let value = match text.parse::<i128>() {
            Ok(value) => value,
            Err(_) if is_decimal(text) => {
                // Too many digits even for i128
                let value = if text.starts_with('-') {
                    i128::MIN
                } else {
                    i128::MAX
                };
                return Err(SchedError::ConfigOutOfRange {
                    tunable,
                    value,
                    max: MAX_TUNABLE,
                });
            }
            Err(_) => {
                return Err(SchedError::InvalidValue {
                    tunable,
                    input: input.to_string(),
                })
            }
        };

        match u64::try_from(value) {
            Ok(value) => self.set(tunable, value),
            Err(_) => Err(SchedError::ConfigOutOfRange {
                tunable,
                value,
                max: MAX_TUNABLE,
            }),
        }
    }
}

fn is_decimal(text: &str) -> bool {
    let digits = text
        .strip_prefix('-')
        .or_else(|| text.strip_prefix('+'))
        .unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

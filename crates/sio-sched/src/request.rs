//! Buffered request records and their classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// Data direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Direction {
    /// Device to memory.
    Read = 0,
    /// Memory to device.
    Write = 1,
}

impl Direction {
    /// Returns the other direction.
    #[inline]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Read => Direction::Write,
            Direction::Write => Direction::Read,
        }
    }

    /// Returns the index for array access (0-1).
    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// One of the four request classes, keyed by `(sync, direction)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestClass {
    /// Whether the issuer waits synchronously for completion.
    pub sync: bool,
    /// Data direction.
    pub direction: Direction,
}

impl RequestClass {
    /// Synchronous reads.
    pub const SYNC_READ: RequestClass = RequestClass::new(true, Direction::Read);
    /// Synchronous writes.
    pub const SYNC_WRITE: RequestClass = RequestClass::new(true, Direction::Write);
    /// Asynchronous reads.
    pub const ASYNC_READ: RequestClass = RequestClass::new(false, Direction::Read);
    /// Asynchronous writes.
    pub const ASYNC_WRITE: RequestClass = RequestClass::new(false, Direction::Write);

    /// All classes, in queue index order.
    pub const ALL: [RequestClass; 4] = [
        RequestClass::ASYNC_READ,
        RequestClass::ASYNC_WRITE,
        RequestClass::SYNC_READ,
        RequestClass::SYNC_WRITE,
    ];

    /// Creates a class from its two keys.
    #[inline]
    pub const fn new(sync: bool, direction: Direction) -> Self {
        Self { sync, direction }
    }

    /// Returns the index for array access (0-3): `sync * 2 + direction`.
    #[inline]
    pub fn as_index(self) -> usize {
        (self.sync as usize) * 2 + self.direction.as_index()
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.sync { "sync" } else { "async" };
        write!(f, "{}-{}", kind, self.direction)
    }
}

/// Stable reference to a request resident in a [`crate::ClassifiedQueueSet`].
///
/// The generation guards against a handle outliving its request and
/// aliasing a later occupant of the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestHandle {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestHandle({}#{})", self.slot, self.generation)
    }
}

/// A buffered I/O request.
///
/// The scheduler only looks at `sync` and `direction`; `payload` is carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord<T> {
    /// Whether the issuer waits synchronously for completion.
    pub sync: bool,
    /// Data direction.
    pub direction: Direction,
    deadline: Timestamp,
    /// Host-owned identity and data.
    pub payload: T,
}

impl<T> RequestRecord<T> {
    /// Creates a record with no deadline assigned yet.
    pub fn new(sync: bool, direction: Direction, payload: T) -> Self {
        Self {
            sync,
            direction,
            deadline: Timestamp::ZERO,
            payload,
        }
    }

    /// Shorthand for a synchronous read.
    pub fn sync_read(payload: T) -> Self {
        Self::new(true, Direction::Read, payload)
    }

    /// Shorthand for a synchronous write.
    pub fn sync_write(payload: T) -> Self {
        Self::new(true, Direction::Write, payload)
    }

    /// Shorthand for an asynchronous read.
    pub fn async_read(payload: T) -> Self {
        Self::new(false, Direction::Read, payload)
    }

    /// Shorthand for an asynchronous write.
    pub fn async_write(payload: T) -> Self {
        Self::new(false, Direction::Write, payload)
    }

    /// Returns the class this request is queued under.
    #[inline]
    pub fn class(&self) -> RequestClass {
        RequestClass::new(self.sync, self.direction)
    }

    /// Returns the deadline assigned at enqueue time.
    #[inline]
    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    /// Consumes the record, returning the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    pub(crate) fn set_deadline(&mut self, deadline: Timestamp) {
        self.deadline = deadline;
    }
}

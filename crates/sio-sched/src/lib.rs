#![warn(missing_docs)]

//! SIO scheduler core: deadline-aware FIFO dispatch for a block device queue
//!
//! Requests are sorted into four FIFO queues by sync/async and read/write.
//! Dispatch serves expired requests first at each batch boundary, then
//! prefers sync reads, forcing writes once reads have starved them for too
//! long. Nothing is sorted by sector, which keeps per-request CPU cost flat.
//!
//! A [`Scheduler`] is not internally synchronized. Callers must serialize
//! all operations on one instance.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod expiry;
pub mod queue_set;
pub mod replay;
pub mod request;
pub mod scheduler;
pub mod starvation;

pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp, DEFAULT_TICK_HZ};
pub use config::{SchedulerConfig, Tunable, Tunables, MAX_TUNABLE};
pub use dispatcher::{DispatchSource, Dispatched, Dispatcher, EXPIRY_SCAN_ORDER};
pub use error::{SchedError, SchedResult};
pub use expiry::{assign_deadline, is_expired};
pub use queue_set::ClassifiedQueueSet;
pub use replay::{replay, ReplayReport, TraceEvent, TracedRequest};
pub use request::{Direction, RequestClass, RequestHandle, RequestRecord};
pub use scheduler::{Scheduler, SchedulerState, SchedulerStats};
pub use starvation::StarvationGuard;

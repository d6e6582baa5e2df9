//! Dispatch ordering.
//!
//! Every `fifo_batch` dispatches the dispatcher looks for an expired request,
//! scanning the class heads async-write, async-read, sync-write, sync-read.
//! Otherwise it serves the preferred direction (reads, or writes once reads
//! have starved them) sync before async, then the other direction in the
//! same sync-before-async order.
//!
//! The two orders differ and are kept as separate functions.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Timestamp;
use crate::config::Tunables;
use crate::expiry::is_expired;
use crate::queue_set::ClassifiedQueueSet;
use crate::request::{Direction, RequestClass, RequestRecord};
use crate::starvation::StarvationGuard;

/// Class heads checked for expiry, highest priority first.
pub const EXPIRY_SCAN_ORDER: [RequestClass; 4] = [
    RequestClass::ASYNC_WRITE,
    RequestClass::ASYNC_READ,
    RequestClass::SYNC_WRITE,
    RequestClass::SYNC_READ,
];

/// Why a request was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchSource {
    /// Its deadline had passed when the batch boundary was checked.
    Expired,
    /// Normal path, reads preferred.
    Normal,
    /// Normal path, writes preferred because reads had starved them.
    ForcedWrite,
}

impl fmt::Display for DispatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchSource::Expired => write!(f, "expired"),
            DispatchSource::Normal => write!(f, "normal"),
            DispatchSource::ForcedWrite => write!(f, "forced_write"),
        }
    }
}

/// A request released by the dispatcher.
#[derive(Debug)]
pub struct Dispatched<T> {
    /// The request, now out of its queue.
    pub record: RequestRecord<T>,
    /// Which path selected it.
    pub source: DispatchSource,
    /// Whether this call scanned for expired requests.
    pub expiry_checked: bool,
}

/// Batch and starvation state driving the dispatch decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatcher {
    batched: u64,
    guard: StarvationGuard,
}

impl Dispatcher {
    /// Creates a dispatcher at the start of a batch with no starvation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches since the current batch started.
    #[inline]
    pub fn batched(&self) -> u64 {
        self.batched
    }

    /// Consecutive read dispatches since the last write.
    #[inline]
    pub fn starved_count(&self) -> u64 {
        self.guard.starved_count()
    }

    /// Returns true if the next dispatch will scan for expired requests.
    #[inline]
    pub fn expiry_check_due(&self) -> bool {
        self.batched == 0
    }

    /// Selects, removes and returns the next request to hand to the device.
    ///
    /// Returns `None` without touching any state when all queues are empty.
    pub fn dispatch<T>(
        &mut self,
        queues: &mut ClassifiedQueueSet<T>,
        tunables: &Tunables,
        now: Timestamp,
    ) -> Option<Dispatched<T>> {
        if queues.is_empty_all() {
            return None;
        }

        let expiry_checked = self.expiry_check_due();
        let expired = if expiry_checked {
            choose_expired(queues, now)
        } else {
            None
        };
        let (class, source) = match expired {
            Some(class) => (class, DispatchSource::Expired),
            None => {
                let forced = self.guard.should_force_writes(tunables);
                let data_dir = if forced {
                    Direction::Write
                } else {
                    Direction::Read
                };
                let class = choose_request(queues, data_dir)?;
                let source = if forced {
                    DispatchSource::ForcedWrite
                } else {
                    DispatchSource::Normal
                };
                (class, source)
            }
        };

        let record = queues.pop_head(class.sync, class.direction)?;
        self.complete(&record, tunables);

        match source {
            DispatchSource::Expired => {
                debug!(
                    "Dispatching expired {} request: deadline={}, now={}",
                    class,
                    record.deadline(),
                    now
                );
            }
            DispatchSource::ForcedWrite => {
                debug!("Writes starved, dispatching {} request", class);
            }
            DispatchSource::Normal => {}
        }

        Some(Dispatched {
            record,
            source,
            expiry_checked,
        })
    }

    fn complete<T>(&mut self, record: &RequestRecord<T>, tunables: &Tunables) {
        self.batched += 1;
        if self.batched >= tunables.fifo_batch() {
            self.batched = 0;
        }
        self.guard.record_dispatch(record.direction);
    }
}

/// Returns the first class, in [`EXPIRY_SCAN_ORDER`], whose head has expired.
pub fn choose_expired<T>(queues: &ClassifiedQueueSet<T>, now: Timestamp) -> Option<RequestClass> {
    EXPIRY_SCAN_ORDER.into_iter().find(|class| {
        queues
            .peek_head(class.sync, class.direction)
            .is_some_and(|rq| is_expired(rq, now))
    })
}

/// Returns the first non-empty class, preferring `data_dir` and sync.
pub fn choose_request<T>(
    queues: &ClassifiedQueueSet<T>,
    data_dir: Direction,
) -> Option<RequestClass> {
    let other = data_dir.opposite();
    [
        RequestClass::new(true, data_dir),
        RequestClass::new(false, data_dir),
        RequestClass::new(true, other),
        RequestClass::new(false, other),
    ]
    .into_iter()
    .find(|class| queues.class_len(*class) > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tunable;
    use crate::expiry::assign_deadline;

    fn queue(
        set: &mut ClassifiedQueueSet<u32>,
        mut rq: RequestRecord<u32>,
        now: Timestamp,
        tunables: &Tunables,
    ) {
        assign_deadline(&mut rq, now, tunables);
        set.enqueue(rq);
    }

    fn tunables(fifo_batch: u64, writes_starved: u64) -> Tunables {
        let mut t = Tunables::default();
        t.set(Tunable::FifoBatch, fifo_batch).unwrap();
        t.set(Tunable::WritesStarved, writes_starved).unwrap();
        t
    }

    #[test]
    fn test_empty_dispatch_is_side_effect_free() {
        let t = tunables(3, 1);
        let mut set: ClassifiedQueueSet<u32> = ClassifiedQueueSet::new();
        let mut d = Dispatcher::new();
        d.batched = 2;
        d.guard.record_dispatch(Direction::Read);

        assert!(d.dispatch(&mut set, &t, Timestamp(1_000_000)).is_none());
        assert_eq!(d.batched(), 2);
        assert_eq!(d.starved_count(), 1);
    }

    #[test]
    fn test_expired_async_write_beats_expired_sync_read() {
        let t = tunables(1, 4);
        let mut set = ClassifiedQueueSet::new();
        queue(&mut set, RequestRecord::sync_read(1), Timestamp(0), &t);
        queue(&mut set, RequestRecord::async_write(2), Timestamp(0), &t);

        let mut d = Dispatcher::new();
        let out = d.dispatch(&mut set, &t, Timestamp(100_000)).unwrap();
        assert_eq!(out.record.payload, 2);
        assert_eq!(out.source, DispatchSource::Expired);
        assert!(out.expiry_checked);
    }

    #[test]
    fn test_expiry_scan_order() {
        let t = tunables(1, 4);
        let mut set = ClassifiedQueueSet::new();
        queue(&mut set, RequestRecord::sync_read(1), Timestamp(0), &t);
        queue(&mut set, RequestRecord::sync_write(2), Timestamp(0), &t);
        queue(&mut set, RequestRecord::async_read(3), Timestamp(0), &t);
        queue(&mut set, RequestRecord::async_write(4), Timestamp(0), &t);

        let mut d = Dispatcher::new();
        let order: Vec<u32> = (0..4)
            .map(|_| d.dispatch(&mut set, &t, Timestamp(100_000)).unwrap().record.payload)
            .collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_normal_path_prefers_sync_read() {
        let t = tunables(1, 4);
        let mut set = ClassifiedQueueSet::new();
        queue(&mut set, RequestRecord::async_write(1), Timestamp(0), &t);
        queue(&mut set, RequestRecord::sync_read(2), Timestamp(0), &t);

        let mut d = Dispatcher::new();
        let out = d.dispatch(&mut set, &t, Timestamp(0)).unwrap();
        assert_eq!(out.record.payload, 2);
        assert_eq!(out.source, DispatchSource::Normal);
    }

    #[test]
    fn test_normal_path_order() {
        let mut set: ClassifiedQueueSet<u32> = ClassifiedQueueSet::new();
        set.enqueue(RequestRecord::async_write(1));
        set.enqueue(RequestRecord::sync_write(2));
        set.enqueue(RequestRecord::async_read(3));

        assert_eq!(
            choose_request(&set, Direction::Read),
            Some(RequestClass::ASYNC_READ)
        );
        assert_eq!(
            choose_request(&set, Direction::Write),
            Some(RequestClass::SYNC_WRITE)
        );
        set.pop_head(false, Direction::Read);
        assert_eq!(
            choose_request(&set, Direction::Read),
            Some(RequestClass::SYNC_WRITE)
        );
    }

    #[test]
    fn test_starvation_forces_write() {
        let t = tunables(1, 1);
        let mut set = ClassifiedQueueSet::new();
        for i in 0..4 {
            queue(&mut set, RequestRecord::sync_read(i), Timestamp(0), &t);
        }
        queue(&mut set, RequestRecord::async_write(100), Timestamp(0), &t);

        let mut d = Dispatcher::new();
        let now = Timestamp(0);
        assert_eq!(d.dispatch(&mut set, &t, now).unwrap().record.payload, 0);
        assert_eq!(d.dispatch(&mut set, &t, now).unwrap().record.payload, 1);

        let forced = d.dispatch(&mut set, &t, now).unwrap();
        assert_eq!(forced.record.payload, 100);
        assert_eq!(forced.source, DispatchSource::ForcedWrite);
        assert_eq!(d.starved_count(), 0);

        assert_eq!(d.dispatch(&mut set, &t, now).unwrap().record.payload, 2);
    }

    #[test]
    fn test_forced_write_falls_back_to_reads() {
        let t = tunables(1, 0);
        let mut set = ClassifiedQueueSet::new();
        queue(&mut set, RequestRecord::async_read(1), Timestamp(0), &t);
        queue(&mut set, RequestRecord::sync_read(2), Timestamp(0), &t);

        let mut d = Dispatcher::new();
        d.guard.record_dispatch(Direction::Read);

        let out = d.dispatch(&mut set, &t, Timestamp(0)).unwrap();
        assert_eq!(out.record.payload, 2);
        assert_eq!(out.source, DispatchSource::ForcedWrite);
        assert_eq!(d.starved_count(), 2);
    }

    #[test]
    fn test_batch_gating() {
        let t = tunables(3, 100);
        let mut set = ClassifiedQueueSet::new();
        for i in 0..6 {
            queue(&mut set, RequestRecord::sync_read(i), Timestamp(0), &t);
        }
        // Expires at tick 16_001, long after the reads are queued
        queue(&mut set, RequestRecord::async_write(100), Timestamp(0), &t);
        let late = Timestamp(20_000);

        let mut d = Dispatcher::new();
        let first = d.dispatch(&mut set, &t, Timestamp(0)).unwrap();
        assert!(first.expiry_checked);
        assert_eq!(first.record.payload, 0);

        for expected in [1, 2] {
            let out = d.dispatch(&mut set, &t, late).unwrap();
            assert!(!out.expiry_checked);
            assert_eq!(out.record.payload, expected);
        }

        let fourth = d.dispatch(&mut set, &t, late).unwrap();
        assert!(fourth.expiry_checked);
        assert_eq!(fourth.record.payload, 100);
        assert_eq!(fourth.source, DispatchSource::Expired);
    }

    #[test]
    fn test_zero_batch_checks_every_time() {
        let t = tunables(0, 4);
        let mut set = ClassifiedQueueSet::new();
        for i in 0..3 {
            queue(&mut set, RequestRecord::sync_read(i), Timestamp(0), &t);
        }
        let mut d = Dispatcher::new();
        for _ in 0..3 {
            assert!(d.dispatch(&mut set, &t, Timestamp(0)).unwrap().expiry_checked);
            assert_eq!(d.batched(), 0);
        }
    }

    #[test]
    fn test_unexpired_heads_use_normal_path() {
        let t = tunables(1, 4);
        let mut set = ClassifiedQueueSet::new();
        queue(&mut set, RequestRecord::async_write(1), Timestamp(0), &t);
        queue(&mut set, RequestRecord::async_read(2), Timestamp(0), &t);

        assert_eq!(choose_expired(&set, Timestamp(4_000)), None);
        assert_eq!(
            choose_expired(&set, Timestamp(4_001)),
            Some(RequestClass::ASYNC_READ)
        );
        assert_eq!(
            choose_expired(&set, Timestamp(16_001)),
            Some(RequestClass::ASYNC_WRITE)
        );
    }
}

//! Per-device scheduler instance.
//!
//! A [`Scheduler`] owns the class queues, tunables, batch and starvation
//! state for one device queue. It performs no locking: the host must
//! serialize every call on a given instance, the same way a block layer
//! serializes elevator callbacks under its queue lock. Separate instances
//! share nothing.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Timestamp;
use crate::config::{SchedulerConfig, Tunable, Tunables};
use crate::dispatcher::{DispatchSource, Dispatched, Dispatcher};
use crate::error::{SchedError, SchedResult};
use crate::expiry::assign_deadline;
use crate::queue_set::ClassifiedQueueSet;
use crate::request::{RequestClass, RequestHandle, RequestRecord};

/// Lifecycle state of a scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Constructed, not yet initialized.
    Uninitialized,
    /// Accepting and dispatching requests.
    Active,
    /// No longer accepting requests; queued ones can still be dispatched.
    Draining,
    /// Torn down; every operation fails.
    Destroyed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Uninitialized => write!(f, "Uninitialized"),
            SchedulerState::Active => write!(f, "Active"),
            SchedulerState::Draining => write!(f, "Draining"),
            SchedulerState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// Statistics for a scheduler instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Total number of requests enqueued.
    pub enqueued: u64,
    /// Total number of requests dispatched.
    pub dispatched: u64,
    /// Dispatches chosen because a deadline had passed.
    pub expired_dispatches: u64,
    /// Dispatches made while writes were being forced.
    pub forced_write_dispatches: u64,
    /// Dispatches that scanned for expired requests.
    pub expiry_checks: u64,
    /// Requests removed out of band.
    pub removed: u64,
    /// Dispatches per class, indexed by [`RequestClass::as_index`].
    pub per_class_dispatched: [u64; 4],
}

impl SchedulerStats {
    #[inline]
    fn record_dispatch(&mut self, class: RequestClass, source: DispatchSource, checked: bool) {
        self.dispatched += 1;
        self.per_class_dispatched[class.as_index()] += 1;
        match source {
            DispatchSource::Expired => self.expired_dispatches += 1,
            DispatchSource::ForcedWrite => self.forced_write_dispatches += 1,
            DispatchSource::Normal => {}
        }
        if checked {
            self.expiry_checks += 1;
        }
    }
}

/// Deadline-aware FIFO scheduler for one device queue.
#[derive(Debug)]
pub struct Scheduler<T> {
    state: SchedulerState,
    tunables: Tunables,
    queues: ClassifiedQueueSet<T>,
    dispatcher: Dispatcher,
    stats: SchedulerStats,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// Creates an uninitialized scheduler.
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Uninitialized,
            tunables: Tunables::default(),
            queues: ClassifiedQueueSet::new(),
            dispatcher: Dispatcher::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Creates and initializes a scheduler in one step.
    pub fn with_config(config: &SchedulerConfig) -> SchedResult<Self> {
        let mut sched = Self::new();
        sched.init(config)?;
        Ok(sched)
    }

    /// Allocates the queues and adopts `config`, moving to `Active`.
    pub fn init(&mut self, config: &SchedulerConfig) -> SchedResult<()> {
        if self.state != SchedulerState::Uninitialized {
            return Err(SchedError::AlreadyInitialized);
        }

        let tunables = config.to_tunables()?;
        let queues = ClassifiedQueueSet::with_capacity(config.initial_capacity)?;

        self.tunables = tunables;
        self.queues = queues;
        self.dispatcher = Dispatcher::new();
        self.stats = SchedulerStats::default();
        self.state = SchedulerState::Active;

        info!(
            "Scheduler initialized: hz={}, fifo_batch={}, writes_starved={}",
            self.tunables.hz(),
            self.tunables.fifo_batch(),
            self.tunables.writes_starved()
        );
        Ok(())
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Queues `record`, stamping its deadline from the current tunables.
    pub fn enqueue(
        &mut self,
        mut record: RequestRecord<T>,
        now: Timestamp,
    ) -> SchedResult<RequestHandle> {
        if self.state != SchedulerState::Active {
            return Err(self.not_active());
        }

        assign_deadline(&mut record, now, &self.tunables);
        let handle = self.queues.enqueue(record);
        self.stats.enqueued += 1;
        Ok(handle)
    }

    /// Releases the next request for the device, or `None` when idle.
    ///
    /// Never fails while `Active` or `Draining`.
    pub fn dispatch(&mut self, now: Timestamp) -> SchedResult<Option<RequestRecord<T>>> {
        Ok(self.dispatch_detailed(now)?.map(|d| d.record))
    }

    /// Like [`Scheduler::dispatch`], also reporting why the request was chosen.
    pub fn dispatch_detailed(&mut self, now: Timestamp) -> SchedResult<Option<Dispatched<T>>> {
        self.ensure_live()?;

        let dispatched = self
            .dispatcher
            .dispatch(&mut self.queues, &self.tunables, now);
        if let Some(d) = &dispatched {
            self.stats
                .record_dispatch(d.record.class(), d.source, d.expiry_checked);
        }
        Ok(dispatched)
    }

    /// Returns the request queued just before `handle` in its class.
    pub fn neighbor_before(&self, handle: RequestHandle) -> SchedResult<Option<RequestHandle>> {
        self.ensure_resident(handle)?;
        Ok(self.queues.neighbor_before(handle))
    }

    /// Returns the request queued just after `handle` in its class.
    pub fn neighbor_after(&self, handle: RequestHandle) -> SchedResult<Option<RequestHandle>> {
        self.ensure_resident(handle)?;
        Ok(self.queues.neighbor_after(handle))
    }

    /// Returns a queued request.
    pub fn get(&self, handle: RequestHandle) -> SchedResult<&RequestRecord<T>> {
        self.ensure_live()?;
        self.queues
            .get(handle)
            .ok_or(SchedError::UnknownRequest(handle))
    }

    /// Takes a queued request out of its class queue without dispatching it.
    ///
    /// Used when another layer absorbs the request, e.g. by merging it into
    /// an adjacent one. Batch and starvation state are untouched.
    pub fn remove(&mut self, handle: RequestHandle) -> SchedResult<RequestRecord<T>> {
        self.ensure_live()?;
        let record = self
            .queues
            .remove(handle)
            .ok_or(SchedError::UnknownRequest(handle))?;
        self.stats.removed += 1;
        debug!("Removed {} request {} out of band", record.class(), handle);
        Ok(record)
    }

    /// Current tunables.
    #[inline]
    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Reads one tunable in its external unit.
    pub fn tunable(&self, tunable: Tunable) -> SchedResult<u64> {
        self.ensure_live()?;
        Ok(self.tunables.get(tunable))
    }

    /// Writes one tunable. Takes effect from the next enqueue or dispatch.
    pub fn set_tunable(&mut self, tunable: Tunable, value: u64) -> SchedResult<()> {
        self.ensure_live()?;
        self.tunables.set(tunable, value)
    }

    /// Parses `name` and `value` text and writes the tunable.
    pub fn store_tunable(&mut self, name: &str, value: &str) -> SchedResult<()> {
        self.ensure_live()?;
        let tunable: Tunable = name.parse()?;
        self.tunables.store(tunable, value)
    }

    /// Total queued requests.
    #[inline]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Returns true iff no request is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty_all()
    }

    /// Read-only view of the class queues.
    #[inline]
    pub fn queues(&self) -> &ClassifiedQueueSet<T> {
        &self.queues
    }

    /// Dispatches since the current batch started.
    #[inline]
    pub fn batched(&self) -> u64 {
        self.dispatcher.batched()
    }

    /// Consecutive read dispatches since the last write.
    #[inline]
    pub fn starved_count(&self) -> u64 {
        self.dispatcher.starved_count()
    }

    /// Scheduler statistics.
    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Stops accepting requests; queued ones can still be dispatched.
    pub fn begin_drain(&mut self) -> SchedResult<()> {
        if self.state != SchedulerState::Active {
            return Err(self.not_active());
        }
        self.state = SchedulerState::Draining;
        debug!("Scheduler draining: {} request(s) queued", self.queues.len());
        Ok(())
    }

    /// Tears the scheduler down.
    ///
    /// # Panics
    ///
    /// Panics with [`SchedError::TeardownInvariantViolated`] if any request is
    /// still queued: the host dropped requests it had handed over.
    pub fn destroy(&mut self) -> SchedResult<()> {
        self.ensure_live()?;

        let pending = self.queues.len();
        if pending != 0 {
            panic!("{}", SchedError::TeardownInvariantViolated { pending });
        }

        self.queues = ClassifiedQueueSet::new();
        self.state = SchedulerState::Destroyed;
        info!(
            "Scheduler destroyed: dispatched={}, expired={}",
            self.stats.dispatched, self.stats.expired_dispatches
        );
        Ok(())
    }

    fn not_active(&self) -> SchedError {
        SchedError::NotActive { state: self.state }
    }

    fn ensure_live(&self) -> SchedResult<()> {
        match self.state {
            SchedulerState::Active | SchedulerState::Draining => Ok(()),
            _ => Err(self.not_active()),
        }
    }

    fn ensure_resident(&self, handle: RequestHandle) -> SchedResult<()> {
        self.ensure_live()?;
        if self.queues.contains(handle) {
            Ok(())
        } else {
            Err(SchedError::UnknownRequest(handle))
        }
    }
}

//! Trace replay harness.
//!
//! Drives a [`Scheduler`] from a recorded sequence of host events on a
//! [`ManualClock`], then drains and tears it down. Useful for checking how
//! tunables shape dispatch order against a fixed workload.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, ManualClock, Timestamp};
use crate::config::Tunable;
use crate::dispatcher::DispatchSource;
use crate::request::{Direction, RequestClass, RequestRecord};
use crate::scheduler::{Scheduler, SchedulerStats};

/// One host event, timestamped in ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A new request arrives.
    Enqueue {
        /// Tick of arrival.
        at: u64,
        /// Host identifier for the request.
        id: u64,
        /// Whether the issuer waits for completion.
        sync: bool,
        /// Data direction.
        dir: Direction,
    },
    /// The device can take one more request.
    Dispatch {
        /// Tick of the call.
        at: u64,
    },
    /// A tunable is changed.
    Set {
        /// Tick of the change.
        at: u64,
        /// Tunable to change.
        tunable: Tunable,
        /// New value in the tunable's external unit.
        value: u64,
    },
}

impl TraceEvent {
    /// Tick at which the event happens.
    pub fn at(&self) -> Timestamp {
        match self {
            TraceEvent::Enqueue { at, .. }
            | TraceEvent::Dispatch { at }
            | TraceEvent::Set { at, .. } => Timestamp(*at),
        }
    }
}

/// Loads a trace: a JSON array of events, or one JSON event per line.
pub fn load_trace(path: &Path) -> anyhow::Result<Vec<TraceEvent>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace {}", path.display()))?;
    parse_trace(&contents)
}

/// Parses trace text in either accepted layout.
pub fn parse_trace(contents: &str) -> anyhow::Result<Vec<TraceEvent>> {
    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(contents).context("parsing trace array");
    }

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("parsing trace line {}", n + 1))
        })
        .collect()
}

/// A request travelling through the scheduler during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracedRequest {
    /// Host identifier.
    pub id: u64,
    /// Tick the request was queued.
    pub queued_at: Timestamp,
}

/// One dispatched request in the replay output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEntry {
    /// Tick of the dispatch.
    pub at: u64,
    /// Host identifier.
    pub id: u64,
    /// Class the request was queued under.
    pub class: RequestClass,
    /// Which path chose it.
    pub source: DispatchSource,
    /// Ticks spent queued.
    pub waited: u64,
    /// True for dispatches made while draining at the end of the trace.
    pub drained: bool,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Dispatches in order.
    pub dispatched: Vec<DispatchEntry>,
    /// Dispatch calls that found nothing queued.
    pub idle_dispatches: u64,
    /// Tunable changes rejected as out of range.
    pub rejected_sets: u64,
    /// Final scheduler statistics.
    pub stats: SchedulerStats,
}

impl ReplayReport {
    /// Dispatched request ids in order.
    pub fn order(&self) -> Vec<u64> {
        self.dispatched.iter().map(|e| e.id).collect()
    }
}

/// Replays `events` against `sched`, then drains and destroys it.
pub fn replay(
    mut sched: Scheduler<TracedRequest>,
    events: &[TraceEvent],
) -> anyhow::Result<ReplayReport> {
    let clock = ManualClock::new(sched.tunables().hz());
    let mut report = ReplayReport::default();

    for event in events {
        clock.set(event.at());
        let now = clock.now();

        match *event {
            TraceEvent::Enqueue { id, sync, dir, .. } => {
                let record = RequestRecord::new(sync, dir, TracedRequest { id, queued_at: now });
                sched
                    .enqueue(record, now)
                    .with_context(|| format!("enqueueing request {}", id))?;
            }
            TraceEvent::Dispatch { .. } => {
                if !dispatch_one(&mut sched, now, false, &mut report)? {
                    report.idle_dispatches += 1;
                }
            }
            TraceEvent::Set { tunable, value, .. } => {
                if let Err(e) = sched.set_tunable(tunable, value) {
                    warn!("Rejected tunable change at {}: {}", now, e);
                    report.rejected_sets += 1;
                }
            }
        }
    }

    let now = clock.now();
    sched.begin_drain()?;
    debug!("Trace finished, draining {} request(s)", sched.len());
    while dispatch_one(&mut sched, now, true, &mut report)? {}

    report.stats = sched.stats().clone();
    sched.destroy()?;
    Ok(report)
}

fn dispatch_one(
    sched: &mut Scheduler<TracedRequest>,
    now: Timestamp,
    drained: bool,
    report: &mut ReplayReport,
) -> anyhow::Result<bool> {
    let Some(d) = sched.dispatch_detailed(now)? else {
        return Ok(false);
    };

    let class = d.record.class();
    let rq = d.record.into_payload();
    report.dispatched.push(DispatchEntry {
        at: now.ticks(),
        id: rq.id,
        class,
        source: d.source,
        waited: now.ticks().saturating_sub(rq.queued_at.ticks()),
        drained,
    });
    Ok(true)
}

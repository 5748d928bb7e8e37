//! Per-frame request scheduling.
//!
//! The [`RequestScheduler`] turns the selector's raw load requests into
//! dispatches:
//!
//! 1. Clear the queue left from the previous frame
//! 2. Collapse duplicates by key, keeping the most urgent priority
//! 3. Skip keys that already have a load in flight
//! 4. Drain in urgency order into a bounded [`LoadDispatcher`] until it
//!    reports [`DispatchOutcome::Saturated`]; the rest is discarded
//!
//! Discarded requests are not lost: the selector re-emits them next frame if
//! the tiles are still needed.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, trace};

use crate::coord::TileKey;
use crate::tile::LoadRequest;

/// Result of offering one request to a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A load task was started.
    Dispatched,
    /// Another load for this key is already running.
    InFlight,
    /// The pool has no room; stop dispatching this frame.
    Saturated,
}

/// Bounded sink for load requests.
pub trait LoadDispatcher {
    /// True if a load for `key` is already running.
    fn is_in_flight(&self, key: &TileKey) -> bool;

    /// Starts a load without blocking.
    fn try_dispatch(&self, request: &LoadRequest) -> DispatchOutcome;
}

/// Counts from one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Requests received from the selector.
    pub requested: usize,
    /// Distinct keys after de-duplication.
    pub unique: usize,
    pub dispatched: usize,
    pub skipped_in_flight: usize,
    /// Requests dropped because the dispatcher saturated.
    pub discarded: usize,
}

/// Heap entry ordered so the most urgent request is the heap maximum.
#[derive(Debug, Clone, Copy)]
struct Pending(LoadRequest);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.urgency_cmp(&self.0)
    }
}

/// Render-thread owned request queue, rebuilt every frame.
#[derive(Debug, Default)]
pub struct RequestScheduler {
    queue: BinaryHeap<Pending>,
    passes: u64,
}

impl RequestScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules one frame's requests.
    pub fn schedule(
        &mut self,
        requests: &[LoadRequest],
        dispatcher: &dyn LoadDispatcher,
    ) -> ScheduleReport {
        self.passes += 1;
        self.queue.clear();

        let mut report = ScheduleReport {
            requested: requests.len(),
            ..Default::default()
        };

        let mut best: HashMap<TileKey, LoadRequest> = HashMap::with_capacity(requests.len());
        for request in requests {
            match best.entry(request.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(*request);
                }
                Entry::Occupied(mut slot) => {
                    if request.is_more_urgent_than(slot.get()) {
                        slot.insert(*request);
                    }
                }
            }
        }
        report.unique = best.len();

        for request in best.into_values() {
            if dispatcher.is_in_flight(&request.key()) {
                report.skipped_in_flight += 1;
            } else {
                self.queue.push(Pending(request));
            }
        }

        while let Some(Pending(request)) = self.queue.pop() {
            match dispatcher.try_dispatch(&request) {
                DispatchOutcome::Dispatched => report.dispatched += 1,
                DispatchOutcome::InFlight => report.skipped_in_flight += 1,
                DispatchOutcome::Saturated => {
                    report.discarded = self.queue.len() + 1;
                    trace!(
                        tile = %request.key(),
                        discarded = report.discarded,
                        "Dispatcher saturated"
                    );
                    self.queue.clear();
                    break;
                }
            }
        }

        if report.dispatched > 0 || report.discarded > 0 {
            debug!(
                pass = self.passes,
                requested = report.requested,
                unique = report.unique,
                dispatched = report.dispatched,
                in_flight = report.skipped_in_flight,
                discarded = report.discarded,
                "Scheduled load requests"
            );
        }
        report
    }

    /// Number of scheduling passes run.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

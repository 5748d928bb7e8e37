//! Priority queue for pool work.
//!
//! Items are ordered by priority (lower values first, since priorities are
//! squared distances from the eye), then by enqueue order (FIFO within the
//! same priority).
//!
//! # Example
//!
//! ```
//! use tilestream::executor::PriorityQueue;
//!
//! let mut queue = PriorityQueue::new();
//! queue.push("far", 100.0);
//! queue.push("near", 1.0);
//!
//! // The nearer item comes out first despite being pushed second
//! assert_eq!(queue.pop().unwrap().item, "near");
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use crate::coord::cmp_f64;

// =============================================================================
// Sequence Number Generator
// =============================================================================

/// Global sequence counter for FIFO ordering within equal priorities.
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

// =============================================================================
// Queued Item
// =============================================================================

/// An item waiting in the queue, with its scheduling metadata.
pub struct QueuedItem<T> {
    pub item: T,

    /// Lower is more urgent.
    pub priority: f64,

    sequence: u64,

    /// When the item was enqueued (for stale detection).
    pub enqueued_at: Instant,
}

impl<T> QueuedItem<T> {
    pub fn new(item: T, priority: f64) -> Self {
        Self {
            item,
            priority,
            sequence: next_sequence(),
            enqueued_at: Instant::now(),
        }
    }

    /// How long this item has been waiting.
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// True if the item has waited longer than `horizon`.
    pub fn is_stale(&self, horizon: Duration) -> bool {
        self.wait_time() > horizon
    }
}

impl<T> std::fmt::Debug for QueuedItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedItem")
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("wait_time", &self.wait_time())
            .finish()
    }
}

// BinaryHeap is a max-heap: the "greatest" item is the lowest priority value,
// then the lowest sequence.
impl<T> PartialEq for QueuedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for QueuedItem<T> {}

impl<T> PartialOrd for QueuedItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueuedItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match cmp_f64(other.priority, self.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

// =============================================================================
// Priority Queue
// =============================================================================

/// Min-priority queue with FIFO tie-breaking.
///
/// Not thread-safe; the retrieval pool wraps it in a mutex.
pub struct PriorityQueue<T> {
    heap: BinaryHeap<QueuedItem<T>>,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, item: T, priority: f64) {
        self.heap.push(QueuedItem::new(item, priority));
    }

    /// Removes and returns the most urgent item.
    pub fn pop(&mut self) -> Option<QueuedItem<T>> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueuedItem<T>> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Removes every item, in arbitrary order.
    pub fn drain(&mut self) -> impl Iterator<Item = QueuedItem<T>> + '_ {
        self.heap.drain()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

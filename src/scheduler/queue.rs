//! Thread-safe URL priority queue
//!
//! A min-heap keyed by earliest-fetch time with FIFO ordering for equal
//! times. Workers block on `wait_and_pop` with a timeout; pushes and
//! shutdown wake waiters. An entry scheduled for the future stays in the
//! heap until its time arrives, so a worker never spins on a deferred URL.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Where a queued URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource {
    /// Passed directly by the caller
    Seed,

    /// Discovered through a sitemap
    Sitemap,

    /// Extracted from a fetched page
    Link,
}

/// A URL waiting to be fetched
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Normalized URL
    pub url: String,

    /// Retries consumed so far (0..=5); block-deferrals do not count
    pub retry_count: u8,

    /// True when the result should update an existing row
    pub is_update: bool,

    /// Do not fetch before this instant
    pub earliest_fetch: Instant,

    /// Origin of this entry
    pub source: UrlSource,

    /// Link depth from the seed (0 for seeds and sitemap URLs)
    pub depth: u32,
}

impl QueueEntry {
    /// Creates an entry that is ready to fetch immediately
    pub fn new(url: String, source: UrlSource) -> Self {
        Self {
            url,
            retry_count: 0,
            is_update: false,
            earliest_fetch: Instant::now(),
            source,
            depth: 0,
        }
    }
}

/// Heap item: entries order by earliest-fetch time, then insertion order
struct HeapItem {
    entry: QueueEntry,
    seq: u64,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the earliest time first
        other
            .entry
            .earliest_fetch
            .cmp(&self.entry.earliest_fetch)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.entry.earliest_fetch == other.entry.earliest_fetch && self.seq == other.seq
    }
}

impl Eq for HeapItem {}

struct Inner {
    heap: BinaryHeap<HeapItem>,
    next_seq: u64,
    shutdown: bool,
}

/// Thread-safe URL priority queue
pub struct UrlQueue {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl UrlQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Pushes an entry and wakes one waiter
    pub fn push(&self, entry: QueueEntry) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(HeapItem { entry, seq });
        drop(inner);
        self.cond.notify_one();
    }

    /// Pops a ready entry without blocking
    ///
    /// Returns None when the queue is empty or the earliest entry is still
    /// scheduled for the future.
    pub fn try_pop(&self) -> Option<QueueEntry> {
        let mut inner = self.inner.lock();
        Self::pop_ready(&mut inner, Instant::now())
    }

    /// Pops a ready entry, blocking up to `timeout`
    ///
    /// Wakes early on pushes and shutdown. After shutdown, remaining
    /// entries still drain; None is returned once the queue is empty.
    pub fn wait_and_pop(&self, timeout: Duration) -> Option<QueueEntry> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        loop {
            let now = Instant::now();

            if let Some(entry) = Self::pop_ready(&mut inner, now) {
                return Some(entry);
            }

            if inner.shutdown && inner.heap.is_empty() {
                return None;
            }

            if now >= deadline {
                return None;
            }

            // Wake when the earliest scheduled entry becomes ready, even
            // if nothing is pushed in the meantime
            let wait_until = match inner.heap.peek() {
                Some(item) if item.entry.earliest_fetch < deadline => item.entry.earliest_fetch,
                _ => deadline,
            };

            self.cond.wait_for(&mut inner, wait_until - now);
        }
    }

    fn pop_ready(inner: &mut Inner, now: Instant) -> Option<QueueEntry> {
        match inner.heap.peek() {
            Some(item) if item.entry.earliest_fetch <= now => {
                inner.heap.pop().map(|item| item.entry)
            }
            _ => None,
        }
    }

    /// Wakes all waiters; the queue drains remaining entries and then
    /// every pop returns None
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        drop(inner);
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }
}

impl Default for UrlQueue {
    fn default() -> Self {
        Self::new()
    }
}

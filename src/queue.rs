//! The pending-batch queue, ordered by priority then arrival.
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{self, AtomicUsize};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::types::job::{Batch, JobId};
use crate::types::priority::Priority;

/// A batch waiting for dispatch, together with the job it belongs to.
#[derive(Debug)]
pub struct QueueEntry {
    pub priority: Priority,
    pub enqueued: Instant,
    pub job_id: JobId,
    pub batch: Batch,
    /// Arrival order, assigned under the queue lock. Breaks priority ties
    /// without relying on clock resolution.
    seq: u64,
}

impl QueueEntry {
    fn key(&self) -> (Priority, u64) {
        (self.priority, self.seq)
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Default)]
struct Inner {
    // BinaryHeap is a max-heap; Reverse makes the smallest key pop first.
    heap: BinaryHeap<Reverse<QueueEntry>>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    inner: Mutex<Inner>,
    /// Mirrors `inner.heap.len()` so emptiness checks never take the lock.
    len: AtomicUsize,
    wakeup: Notify,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, job_id: JobId, batch: Batch, priority: Priority) {
        {
            let mut inner =
                self.inner.lock().unwrap_or_else(PoisonError::into_inner);

            let seq = inner.next_seq;
            inner.next_seq += 1;

            inner.heap.push(Reverse(QueueEntry {
                priority,
                enqueued: Instant::now(),
                job_id,
                batch,
                seq,
            }));
            self.len.store(inner.heap.len(), atomic::Ordering::Release);
        }

        self.wakeup.notify_one();
    }

    /// Removes and returns the entry with the smallest (priority, arrival).
    pub fn extract_next(&self) -> Option<QueueEntry> {
        let mut inner =
            self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let Reverse(entry) = inner.heap.pop()?;
        self.len.store(inner.heap.len(), atomic::Ordering::Release);

        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.len.load(atomic::Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once something has been enqueued since the last wake-up.
    ///
    /// A notification sent while nobody is waiting is kept, so calling this
    /// after an `is_empty` check cannot miss an enqueue that raced it. The
    /// queue may still be empty on return if another consumer got there
    /// first.
    pub async fn wait_for_entries(&self) {
        self.wakeup.notified().await
    }
}

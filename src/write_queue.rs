//! §4.6 Write Queue — a bounded FIFO with drop-oldest (ring) semantics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::subject::model::PropertyHandle;
use crate::value::PropertyValue;

/// One buffered write, per §3 "Write Queue Entry".
pub struct WriteQueueEntry {
    pub property: PropertyHandle,
    pub value: PropertyValue,
    pub source_timestamp: DateTime<Utc>,
}

/// Bounded concurrent FIFO of write entries (§4.6). Enqueues beyond `max_size` drop
/// from the head and increment `dropped_count`; `max_size == 0` disables buffering
/// entirely (the whole incoming batch is dropped and logged).
pub struct WriteQueue {
    max_size: usize,
    entries: Mutex<VecDeque<WriteQueueEntry>>,
    dropped_count: AtomicUsize,
}

impl WriteQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: Mutex::new(VecDeque::new()),
            dropped_count: AtomicUsize::new(0),
        }
    }

    /// Append all entries, then while `count > max_size` drop from the head,
    /// incrementing `dropped_count` per drop (§4.6, §8 testable property 4).
    pub fn enqueue_batch(&self, batch: Vec<WriteQueueEntry>) {
        if self.max_size == 0 {
            if !batch.is_empty() {
                log::warn!(
                    "write queue disabled (write_queue_size=0); dropping {} entries",
                    batch.len()
                );
                self.dropped_count
                    .fetch_add(batch.len(), Ordering::Relaxed);
            }
            return;
        }

        let mut entries = self.entries.lock();
        entries.extend(batch);
        let mut dropped = 0usize;
        while entries.len() > self.max_size {
            entries.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            self.dropped_count.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    /// Drain all queued entries in FIFO order. If the drained list is non-empty,
    /// the dropped counter resets (§4.6) — a successful flush means the backlog
    /// that produced those drops is gone.
    pub fn dequeue_all(&self) -> Vec<WriteQueueEntry> {
        let mut entries = self.entries.lock();
        let drained: Vec<_> = entries.drain(..).collect();
        if !drained.is_empty() {
            self.dropped_count.store(0, Ordering::Relaxed);
        }
        drained
    }

    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped_count.load(Ordering::Relaxed)
    }
}

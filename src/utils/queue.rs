//! # Safe Queue
//!
//! Concurrent FIFO shared by a producer and a consumer on different threads.
//! Inbound packets flow from the read pipeline to the polling consumer, and
//! outbound packets from `send_*` callers to the write pipeline.
//!
//! Operations never block on I/O and never fail. A poisoned lock is
//! recovered, since a `VecDeque` cannot be left half-updated by any of the
//! operations below.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct SafeQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> SafeQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the back of the queue.
    pub fn enqueue(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Take the front item, or `None` immediately if the queue is empty.
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Drop every pending item in one step.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for SafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

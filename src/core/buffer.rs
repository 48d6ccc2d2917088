use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use super::RawMessage;
use super::metrics::RadarMetrics;

/// Bounded FIFO between the stream connector and the classifier pool.
///
/// `push` never waits: when the buffer is full the oldest queued message is
/// evicted to make room, and the eviction is counted in `dropped`.
#[derive(Debug)]
pub struct IngressBuffer {
    queue: Mutex<VecDeque<RawMessage>>,
    capacity: usize,
    notify: Notify,
    metrics: Arc<RadarMetrics>,
}

impl IngressBuffer {
    pub fn new(capacity: usize, metrics: Arc<RadarMetrics>) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            notify: Notify::new(),
            metrics,
        }
    }

    // A panic while holding the lock cannot leave the deque half-mutated,
    // so a poisoned guard is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<RawMessage>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a message, returning the evicted oldest entry if the buffer was full.
    pub fn push(&self, msg: RawMessage) -> Option<RawMessage> {
        let evicted = {
            let mut queue = self.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(msg);
            evicted
        };
        if evicted.is_some() {
            let total = self.metrics.record_drop();
            if total.is_power_of_two() {
                tracing::warn!(dropped_total = total, capacity = self.capacity, "Ingress buffer full, evicting oldest");
            }
        }
        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<RawMessage> {
        self.lock().pop_front()
    }

    /// Wait until a message is available and take it.
    pub async fn pop(&self) -> RawMessage {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(msg) = self.try_pop() {
                return msg;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

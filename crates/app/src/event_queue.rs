//! Bounded, drop-oldest channel from the Scanner to the Cache (§4.3, §5).
//!
//! `tokio::sync::mpsc` blocks the sender when full; the spec instead wants
//! the *oldest* pending event evicted so the scan loop never stalls. A
//! `Mutex<VecDeque>` plus a `Notify` gives the consumer an async `recv()`
//! without pulling in an extra channel crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

/// A raw scanner observation: one advertisement's service data plus its
/// signal strength, handed to [`mijiableht_app::SensorCache::ingest`](crate::cache::SensorCache::ingest).
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerEvent {
    pub mac: mijiableht_domain::mac::MacAddress,
    pub rssi: Option<i8>,
    pub service_data: Vec<u8>,
    pub received_at: mijiableht_domain::time::Timestamp,
}

/// Bounded queue that drops the oldest entry instead of blocking the
/// producer when full. Cloning shares the same underlying queue.
pub struct EventQueue {
    inner: Mutex<VecDeque<ScannerEvent>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an event, evicting the oldest pending one if the queue is at
    /// capacity. Never blocks.
    pub fn push(&self, event: ScannerEvent) {
        let mut queue = self.inner.lock().expect("event queue mutex poisoned");
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    /// Wait for and remove the oldest event.
    pub async fn recv(&self) -> ScannerEvent {
        loop {
            {
                let mut queue = self.inner.lock().expect("event queue mutex poisoned");
                if let Some(event) = queue.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Total number of events dropped for being the oldest in a full
    /// queue — surfaced as the `ScannerBacklog` metric (§4.3).
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

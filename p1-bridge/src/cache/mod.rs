use std::{collections::VecDeque, sync::Arc};

use p1_domain::domain::Reading;

use crate::config::RequeuePolicy;

/// Cache handle shared by the live path and the retry scheduler.
///
/// The lock is only held for cache mutations, never across a sink call or an
/// overflow write.
pub type SharedCache = Arc<tokio::sync::Mutex<BoundedRetryCache>>;

/// Receives readings the cache had to evict. Called without the cache lock.
pub trait Overflow: Send + Sync {
    fn absorb(&self, evicted: &[Reading]);
}

/// FIFO queue of readings whose delivery failed, bounded to `max_length`.
///
/// When full, the oldest readings are dropped and returned to the caller.
/// [`admit`] forwards them to the overflow hook once the lock is released.
/// Eviction is never reported as an error.
pub struct BoundedRetryCache {
    entries: VecDeque<Reading>,
    max_length: usize,
    overflow: Option<Arc<dyn Overflow>>,
}

impl BoundedRetryCache {
    pub fn new(max_length: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_length,
            overflow: None,
        }
    }

    pub fn with_overflow(max_length: usize, overflow: Arc<dyn Overflow>) -> Self {
        Self {
            overflow: Some(overflow),
            ..Self::new(max_length)
        }
    }

    /// Appends readings at the tail in order, evicting from the head whenever
    /// the cache grows past `max_length`. Returns the evicted readings, oldest
    /// first.
    pub fn enqueue<I>(&mut self, readings: I) -> Vec<Reading>
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut evicted = Vec::new();
        for reading in readings {
            self.entries.push_back(reading);
            while self.entries.len() > self.max_length {
                if let Some(oldest) = self.entries.pop_front() {
                    evicted.push(oldest);
                }
            }
        }
        self.after_mutation(&evicted);
        evicted
    }

    /// Puts a batch back at the head, ahead of everything queued meanwhile.
    /// Returns the evicted readings, oldest first.
    pub fn requeue_front(&mut self, batch: Vec<Reading>) -> Vec<Reading> {
        for reading in batch.into_iter().rev() {
            self.entries.push_front(reading);
        }

        let excess = self.entries.len().saturating_sub(self.max_length);
        let evicted: Vec<Reading> = self.entries.drain(..excess).collect();
        self.after_mutation(&evicted);
        evicted
    }

    /// Removes up to `max_size` readings from the head.
    pub fn dequeue_batch(&mut self, max_size: usize) -> Vec<Reading> {
        let n = max_size.min(self.entries.len());
        let batch: Vec<Reading> = self.entries.drain(..n).collect();
        self.after_mutation(&[]);
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn overflow(&self) -> Option<Arc<dyn Overflow>> {
        self.overflow.clone()
    }

    fn after_mutation(&self, evicted: &[Reading]) {
        metrics::gauge!("retry_cache_length").set(self.entries.len() as f64);

        if evicted.is_empty() {
            return;
        }

        metrics::counter!("retry_cache_evicted_total").increment(evicted.len() as u64);
        tracing::warn!(
            evicted = evicted.len(),
            max_length = self.max_length,
            oldest_ts = %evicted[0].ts,
            "retry cache full, evicting oldest readings"
        );
    }
}

/// Admits `readings` at the tail (`Tail`) or head (`Head`) and hands anything
/// evicted to the overflow hook after the lock is dropped. Returns the cache
/// length after admission.
pub async fn admit(cache: &SharedCache, readings: Vec<Reading>, at: RequeuePolicy) -> usize {
    let (evicted, overflow, len) = {
        let mut cache = cache.lock().await;
        let evicted = match at {
            RequeuePolicy::Head => cache.requeue_front(readings),
            RequeuePolicy::Tail => cache.enqueue(readings),
        };
        (evicted, cache.overflow(), cache.len())
    };

    if let Some(overflow) = overflow {
        if !evicted.is_empty() {
            overflow.absorb(&evicted);
        }
    }
    len
}

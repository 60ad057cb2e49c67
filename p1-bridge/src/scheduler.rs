use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::time::MissedTickBehavior;

use crate::{
    cache::{self, SharedCache},
    config::RequeuePolicy,
    delivery::DeliveryWriter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cache was empty, no sink call was made.
    Idle,
    Delivered(usize),
    /// Delivery failed and the batch went back into the cache.
    Requeued(usize),
}

/// Periodically drains the retry cache, one batch per tick.
pub struct RetryScheduler {
    cache: SharedCache,
    writer: Arc<DeliveryWriter>,
    batch_size: usize,
    interval: Duration,
    requeue: RequeuePolicy,
}

impl RetryScheduler {
    pub fn new(
        cache: SharedCache,
        writer: Arc<DeliveryWriter>,
        batch_size: usize,
        interval: Duration,
        requeue: RequeuePolicy,
    ) -> Self {
        Self {
            cache,
            writer,
            batch_size: batch_size.max(1),
            interval,
            requeue,
        }
    }

    /// One retry attempt. The cache lock is released while the write is in
    /// flight so the live path can keep caching failures.
    pub async fn tick(&self) -> TickOutcome {
        let batch = {
            let mut cache = self.cache.lock().await;
            if cache.is_empty() {
                return TickOutcome::Idle;
            }
            cache.dequeue_batch(self.batch_size)
        };

        let n = batch.len();
        match self.writer.write(batch).await {
            Ok(()) => {
                let remaining = self.cache.lock().await.len();
                tracing::info!(delivered = n, remaining, "retried batch delivered");
                TickOutcome::Delivered(n)
            }
            Err(e) => {
                let cached = cache::admit(&self.cache, e.batch, self.requeue).await;
                tracing::warn!(
                    error = %e.source,
                    readings = n,
                    cached,
                    "retry failed, batch returned to cache"
                );
                TickOutcome::Requeued(n)
            }
        }
    }

    /// Ticks forever. Ticks never overlap: a slow attempt delays the next one.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "retry scheduler started"
        );

        loop {
            interval.tick().await;
            metrics::counter!("retry_ticks_total").increment(1);

            if let Err(panic) = AssertUnwindSafe(self.tick()).catch_unwind().await {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(panic = %msg, "retry tick panicked, continuing");
            }
        }
    }
}

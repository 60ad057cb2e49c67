use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use p1_domain::domain::Reading;
use tokio::task::JoinSet;

use crate::{
    cache::{self, BoundedRetryCache, Overflow, SharedCache},
    config::{RequeuePolicy, SpillPolicy},
    delivery::DeliveryWriter,
    sinks::{SpillError, SpillFile},
};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("delivery error: {0}")]
    Delivery(String),
}

/// Lifecycle and data events emitted by a reading source.
#[derive(Debug)]
pub enum SourceEvent {
    /// The source is attached to its input; carries a human readable endpoint.
    Connected(String),
    Reading(Envelope<Reading>),
    Error(PipelineError),
    Closed,
}

pub type EventStream = Pin<Box<dyn Stream<Item = SourceEvent> + Send>>;

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn events(&self) -> EventStream;
}

#[async_trait::async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, input: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError>;
}

/// Live path: every reading from the source is written straight to the sink
/// and falls back to the retry cache when that write fails.
pub struct Bridge<S> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform>>,
    pub writer: Arc<DeliveryWriter>,
    pub cache: SharedCache,
    pub spill: Option<(Arc<SpillFile>, SpillPolicy)>,
}

impl<S> Bridge<S>
where
    S: Source + 'static,
{
    /// Consumes source events until the source ends, then waits for the live
    /// deliveries still in flight.
    pub async fn run(self) {
        let mut events = self.source.events().await;
        let mut in_flight = JoinSet::new();

        while let Some(event) = events.next().await {
            match event {
                SourceEvent::Connected(endpoint) => {
                    tracing::info!(%endpoint, "reading source connected");
                }
                SourceEvent::Reading(env) => {
                    metrics::counter!("source_readings_total").increment(1);
                    let Some(env) = self.apply_transforms(env).await else {
                        continue;
                    };

                    let writer = self.writer.clone();
                    let cache = self.cache.clone();
                    let spill = self.failed_spill();
                    in_flight.spawn(deliver_live(writer, cache, spill, env));
                }
                SourceEvent::Error(e) => {
                    metrics::counter!("source_errors_total").increment(1);
                    tracing::warn!(error = %e, "reading source reported an error");
                }
                SourceEvent::Closed => {
                    tracing::warn!("reading source closed");
                }
            }

            while let Some(res) = in_flight.try_join_next() {
                log_join_result(res);
            }
        }

        while let Some(res) = in_flight.join_next().await {
            log_join_result(res);
        }
        tracing::info!("reading source finished");
    }

    async fn apply_transforms(&self, mut env: Envelope<Reading>) -> Option<Envelope<Reading>> {
        for t in &self.transforms {
            env = match t.apply(env).await {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!(error = %e, "reading rejected");
                    return None;
                }
            };
        }
        Some(env)
    }

    fn failed_spill(&self) -> Option<Arc<SpillFile>> {
        match &self.spill {
            Some((file, SpillPolicy::Failed)) => Some(file.clone()),
            _ => None,
        }
    }
}

fn log_join_result(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        tracing::error!(error = %e, "live delivery task failed unexpectedly");
    }
}

/// One live delivery attempt for a single reading.
pub async fn deliver_live(
    writer: Arc<DeliveryWriter>,
    cache: SharedCache,
    spill: Option<Arc<SpillFile>>,
    env: Envelope<Reading>,
) {
    match writer.write(vec![env.payload]).await {
        Ok(()) => {
            if let Ok(dur) = SystemTime::now().duration_since(env.received_at) {
                metrics::histogram!("live_delivery_latency_seconds").record(dur.as_secs_f64());
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "live write failed, caching reading for retry");
            if let Some(spill) = spill {
                if let Err(se) = spill.append(&e.batch) {
                    tracing::error!(error = %se, "failed to append undelivered reading to spill file");
                }
            }
            cache::admit(&cache, e.batch, RequeuePolicy::Tail).await;
        }
    }
}

/// Builds the retry cache for the configured spill policy. Only `Evicted`
/// attaches the spill file as the overflow hook; `Failed` spills from
/// [`deliver_live`] instead.
pub fn retry_cache(max_length: usize, spill: Option<&(Arc<SpillFile>, SpillPolicy)>) -> SharedCache {
    let cache = match spill {
        Some((file, SpillPolicy::Evicted)) => {
            let overflow: Arc<dyn Overflow> = file.clone();
            BoundedRetryCache::with_overflow(max_length, overflow)
        }
        _ => BoundedRetryCache::new(max_length),
    };
    Arc::new(tokio::sync::Mutex::new(cache))
}

/// Moves everything still cached into the spill file. Used on shutdown so
/// undelivered readings survive the process.
pub async fn spill_remaining(cache: &SharedCache, file: &SpillFile) -> Result<usize, SpillError> {
    let remaining = cache.lock().await.dequeue_batch(usize::MAX);
    if let Err(e) = file.append(&remaining) {
        cache.lock().await.requeue_front(remaining);
        return Err(e);
    }
    Ok(remaining.len())
}

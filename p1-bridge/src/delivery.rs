use std::{sync::Arc, time::Instant};

use p1_domain::domain::Reading;

use crate::sinks::{line_protocol, SinkClient, SinkError};

/// A failed delivery attempt. Hands the batch back to the caller so it can be
/// cached for a later retry.
#[derive(thiserror::Error, Debug)]
#[error("failed to deliver {} readings: {source}", .batch.len())]
pub struct DeliveryError {
    pub batch: Vec<Reading>,
    #[source]
    pub source: SinkError,
}

/// Turns a batch of readings into one write request against the sink.
///
/// Each call is exactly one attempt. The writer never retries and never
/// touches the retry cache.
pub struct DeliveryWriter {
    client: Arc<dyn SinkClient>,
    measurement: String,
}

impl DeliveryWriter {
    pub fn new(client: Arc<dyn SinkClient>, measurement: impl Into<String>) -> Self {
        Self {
            client,
            measurement: measurement.into(),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub async fn write(&self, batch: Vec<Reading>) -> Result<(), DeliveryError> {
        if batch.is_empty() {
            return Ok(());
        }

        let payload = line_protocol::encode_batch(&self.measurement, &batch);
        let started = Instant::now();

        match self.client.write_lines(payload).await {
            Ok(()) => {
                metrics::counter!("delivered_readings_total").increment(batch.len() as u64);
                metrics::histogram!("sink_write_latency_seconds").record(started.elapsed().as_secs_f64());
                tracing::debug!(readings = batch.len(), "batch delivered");
                Ok(())
            }
            Err(source) => {
                metrics::counter!("sink_write_failures_total").increment(1);
                Err(DeliveryError { batch, source })
            }
        }
    }
}

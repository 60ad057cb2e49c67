use anyhow::{bail, Result};
use futures::StreamExt;
use p1_bridge::{
    config::AppConfig,
    observability,
    pipeline::{Source, SourceEvent},
    sinks,
    sources::SpillFileSource,
    DeliveryWriter,
};
use p1_domain::domain::Reading;
use std::env;

/// Replay a spill file into the configured database.
///
/// Usage:
///   replay_spill <path_to_spill_file>
///
/// Readings are sent in `cache.retry_batch_size` chunks. The first failed
/// batch aborts the replay; everything before it has been delivered, so the
/// file can be trimmed and replayed again.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: replay_spill <spill_file_path>");
    }
    let file_path = &args[1];

    // Load configuration (P1_BRIDGE_CONFIG can point to a replay-specific file).
    let cfg = AppConfig::load()?;

    let client = sinks::connect(&cfg.influx)?;
    let writer = DeliveryWriter::new(client, cfg.influx.measurement.clone());
    let batch_size = cfg.cache.retry_batch_size;

    let source = SpillFileSource::new(file_path);
    let mut events = source.events().await;
    let mut buffer: Vec<Reading> = Vec::with_capacity(batch_size);
    let mut delivered = 0usize;
    let mut skipped = 0usize;

    while let Some(event) = events.next().await {
        match event {
            SourceEvent::Connected(endpoint) => tracing::info!(%endpoint, "replaying spill file"),
            SourceEvent::Reading(env) => {
                buffer.push(env.payload);
                if buffer.len() >= batch_size {
                    delivered += flush(&writer, &mut buffer, delivered).await?;
                }
            }
            SourceEvent::Error(e) => {
                skipped += 1;
                tracing::warn!(error = %e, "skipping spill record");
            }
            SourceEvent::Closed => {}
        }
    }

    if !buffer.is_empty() {
        delivered += flush(&writer, &mut buffer, delivered).await?;
    }

    tracing::info!(delivered, skipped, "spill file replayed");
    Ok(())
}

async fn flush(writer: &DeliveryWriter, buffer: &mut Vec<Reading>, delivered: usize) -> Result<usize> {
    let batch = std::mem::take(buffer);
    let n = batch.len();
    if let Err(e) = writer.write(batch).await {
        bail!("replay stopped after {delivered} delivered readings: {e}");
    }
    Ok(n)
}

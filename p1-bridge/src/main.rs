use anyhow::Result;
use p1_bridge::{
    config::{AppConfig, SourceKind, SpillPolicy},
    metrics_server,
    observability,
    pipeline::{self, Bridge, Source},
    scheduler::RetryScheduler,
    sinks::{self, SpillFile},
    sources::{HttpTelegramSource, NdjsonSource},
    transform, DeliveryWriter, SharedCache,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    observability::install_panic_hook();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let spill = match &cfg.spill {
        Some(spill_cfg) => {
            let file = Arc::new(SpillFile::open(&spill_cfg.path)?);
            tracing::info!(path = %file.path().display(), policy = ?spill_cfg.policy, "spill file enabled");
            Some((file, spill_cfg.policy))
        }
        None => None,
    };

    let cache = pipeline::retry_cache(cfg.cache.max_length, spill.as_ref());

    let client = sinks::connect(&cfg.influx)?;
    let writer = Arc::new(DeliveryWriter::new(client, cfg.influx.measurement.clone()));
    tracing::info!(
        host = %cfg.influx.host,
        port = cfg.influx.port,
        protocol = cfg.influx.protocol.scheme(),
        database = %cfg.influx.database,
        max_length = cfg.cache.max_length,
        "delivering readings"
    );

    let scheduler = RetryScheduler::new(
        cache.clone(),
        writer.clone(),
        cfg.cache.retry_batch_size,
        cfg.cache.retry_interval(),
        cfg.cache.requeue,
    );
    tokio::spawn(scheduler.run());

    match cfg.source.kind {
        SourceKind::Http => {
            let source =
                HttpTelegramSource::new(&cfg.source.http_bind_addr, cfg.source.channel_capacity).await?;
            spawn_bridge(source, writer, cache.clone(), spill.clone());
        }
        SourceKind::Stdin => {
            spawn_bridge(NdjsonSource::stdin(), writer, cache.clone(), spill.clone());
        }
    }

    tokio::signal::ctrl_c().await?;
    match &spill {
        Some((file, _)) => match pipeline::spill_remaining(&cache, file).await {
            Ok(spilled) => {
                tracing::info!(spilled, path = %file.path().display(), "shutdown requested, cache spilled")
            }
            Err(e) => {
                let remaining = cache.lock().await.len();
                tracing::error!(error = %e, undelivered = remaining, "shutdown requested, spilling cache failed");
            }
        },
        None => {
            let remaining = cache.lock().await.len();
            tracing::info!(undelivered = remaining, "shutdown requested");
        }
    }

    Ok(())
}

fn spawn_bridge<S>(
    source: S,
    writer: Arc<DeliveryWriter>,
    cache: SharedCache,
    spill: Option<(Arc<SpillFile>, SpillPolicy)>,
) where
    S: Source + 'static,
{
    let bridge = Bridge {
        source,
        transforms: vec![Arc::new(transform::ReadingValidation::default())],
        writer,
        cache,
        spill,
    };
    tokio::spawn(bridge.run());
}

//! Live path, retry cache and scheduler against a fake InfluxDB over HTTP.

use std::{
    io::Cursor,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{extract::State, http::StatusCode, routing::post, Router};
use p1_bridge::{
    cache::BoundedRetryCache,
    config::{InfluxConfig, RequeuePolicy, SinkProtocol},
    pipeline::Bridge,
    scheduler::{RetryScheduler, TickOutcome},
    sinks,
    sources::NdjsonSource,
    transform::ReadingValidation,
    DeliveryWriter, SharedCache,
};

#[derive(Clone)]
struct FakeInflux {
    /// Number of leading requests answered with 503.
    fail_first: usize,
    seen: Arc<AtomicUsize>,
    accepted: Arc<Mutex<Vec<String>>>,
}

async fn write(State(fake): State<FakeInflux>, body: String) -> StatusCode {
    let n = fake.seen.fetch_add(1, Ordering::SeqCst);
    if n < fake.fail_first {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    fake.accepted.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

async fn spawn_fake(fail_first: usize) -> (SocketAddr, FakeInflux) {
    let fake = FakeInflux {
        fail_first,
        seen: Arc::new(AtomicUsize::new(0)),
        accepted: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/write", post(write))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    (addr, fake)
}

fn telegram(ts: &str, gas: f64) -> String {
    serde_json::json!({
        "timestamp": ts,
        "electricity": { "received": {
            "tariff1": { "reading": 100.5 },
            "tariff2": { "reading": 200.25 },
            "actual": { "reading": 0.75 }
        } },
        "gas": { "reading": gas }
    })
    .to_string()
}

fn writer_for(addr: SocketAddr) -> Arc<DeliveryWriter> {
    let cfg = InfluxConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        protocol: SinkProtocol::Http,
        timeout_secs: 5,
        ..InfluxConfig::default()
    };
    let client = sinks::connect(&cfg).unwrap();
    Arc::new(DeliveryWriter::new(client, cfg.measurement))
}

fn bridge(input: String, writer: Arc<DeliveryWriter>, cache: SharedCache) -> Bridge<NdjsonSource<Cursor<Vec<u8>>>> {
    Bridge {
        source: NdjsonSource::new("test-input", Cursor::new(input.into_bytes())),
        transforms: vec![Arc::new(ReadingValidation)],
        writer,
        cache,
        spill: None,
    }
}

#[tokio::test]
async fn reading_survives_a_transient_outage() {
    let (addr, fake) = spawn_fake(1).await;
    let writer = writer_for(addr);
    let cache: SharedCache = Arc::new(tokio::sync::Mutex::new(BoundedRetryCache::new(100)));

    let input = format!("{}\n", telegram("2024-01-01T00:00:00Z", 42.5));
    bridge(input, writer.clone(), cache.clone()).run().await;

    assert_eq!(cache.lock().await.len(), 1);
    assert!(fake.accepted.lock().unwrap().is_empty());

    let scheduler = RetryScheduler::new(
        cache.clone(),
        writer,
        300,
        Duration::from_secs(60),
        RequeuePolicy::Head,
    );
    assert_eq!(scheduler.tick().await, TickOutcome::Delivered(1));
    assert!(cache.lock().await.is_empty());

    let accepted = fake.accepted.lock().unwrap().clone();
    assert_eq!(
        accepted,
        vec![
            "p1-readings electricity_tarrif1=100.5,electricity_tarrif2=200.25,\
             electricity_actual=0.75,gas_reading=42.5 1704067200\n"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn outage_evicts_oldest_then_drains_in_batches() {
    let (addr, fake) = spawn_fake(4).await;
    let writer = writer_for(addr);
    let cache: SharedCache = Arc::new(tokio::sync::Mutex::new(BoundedRetryCache::new(3)));

    // Fed one at a time so arrival order in the cache is deterministic.
    for (i, ts) in ["00:00:01", "00:00:02", "00:00:03", "00:00:04"].iter().enumerate() {
        let input = format!("{}\n", telegram(&format!("2024-01-01T{ts}Z"), i as f64));
        bridge(input, writer.clone(), cache.clone()).run().await;
    }
    assert_eq!(cache.lock().await.len(), 3);

    let scheduler = RetryScheduler::new(
        cache.clone(),
        writer,
        2,
        Duration::from_secs(60),
        RequeuePolicy::Head,
    );
    assert_eq!(scheduler.tick().await, TickOutcome::Delivered(2));
    assert_eq!(cache.lock().await.len(), 1);

    let accepted = fake.accepted.lock().unwrap().clone();
    assert_eq!(accepted.len(), 1);
    let stamps: Vec<&str> = accepted[0]
        .lines()
        .map(|l| l.rsplit(' ').next().unwrap())
        .collect();
    assert_eq!(stamps, vec!["1704067202", "1704067203"]);

    assert_eq!(scheduler.tick().await, TickOutcome::Delivered(1));
    assert_eq!(scheduler.tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn invalid_and_partial_telegrams_are_never_delivered() {
    let (addr, fake) = spawn_fake(0).await;
    let writer = writer_for(addr);
    let cache: SharedCache = Arc::new(tokio::sync::Mutex::new(BoundedRetryCache::new(10)));

    let negative = telegram("2024-01-01T00:00:00Z", -1.0);
    let partial = r#"{"timestamp":"2024-01-01T00:00:00Z","gas":{"reading":1}}"#;
    let input = format!("{negative}\n{partial}\n");
    bridge(input, writer, cache.clone()).run().await;

    assert!(fake.accepted.lock().unwrap().is_empty());
    assert_eq!(fake.seen.load(Ordering::SeqCst), 0);
    assert!(cache.lock().await.is_empty());
}

use std::{net::SocketAddr, sync::Arc};

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    pipeline::{Envelope, EventStream, PipelineError, Source, SourceEvent},
    sources::telegram,
};

#[derive(Clone)]
struct SharedSender {
    tx: mpsc::Sender<SourceEvent>,
}

/// Receives decoded telegrams from an external P1 reader over HTTP.
///
/// `POST /telegram` takes one telegram object or an array of them.
pub struct HttpTelegramSource {
    local_addr: SocketAddr,
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<SourceEvent>>>>,
}

impl HttpTelegramSource {
    pub async fn new(bind_addr: &str, channel_capacity: usize) -> Result<Self, PipelineError> {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let shared = SharedSender { tx: tx.clone() };

        let app = Router::new()
            .route("/telegram", post(ingest_telegram))
            .with_state(shared);

        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| PipelineError::Source(format!("failed to bind telegram listener: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PipelineError::Source(format!("failed to read listener address: {e}")))?;

        let _ = tx
            .send(SourceEvent::Connected(format!("http://{local_addr}/telegram")))
            .await;

        tokio::spawn(async move {
            let event = match axum::serve(listener, app.into_make_service()).await {
                Ok(()) => SourceEvent::Closed,
                Err(e) => SourceEvent::Error(PipelineError::Source(format!("telegram server error: {e}"))),
            };
            let _ = tx.send(event).await;
        });

        Ok(Self {
            local_addr,
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait::async_trait]
impl Source for HttpTelegramSource {
    async fn events(&self) -> EventStream {
        let mut guard = self.receiver.lock().await;
        match guard.take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => {
                tracing::error!("HttpTelegramSource events already taken; only one consumer supported");
                Box::pin(futures::stream::empty::<SourceEvent>())
            }
        }
    }
}

async fn ingest_telegram(State(sender): State<SharedSender>, body: Bytes) -> StatusCode {
    metrics::counter!("http_telegram_requests_total").increment(1);

    let results = match telegram::parse_telegrams(&body) {
        Ok(results) => results,
        Err(e) => {
            let _ = sender.tx.send(SourceEvent::Error(e)).await;
            return StatusCode::BAD_REQUEST;
        }
    };

    let mut status = StatusCode::ACCEPTED;
    for result in results {
        let event = match result {
            Ok(reading) => SourceEvent::Reading(Envelope::now(reading)),
            Err(e) => {
                status = StatusCode::BAD_REQUEST;
                SourceEvent::Error(e)
            }
        };

        if sender.tx.send(event).await.is_err() {
            // Nobody consumes events any more.
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }

    status
}

use std::sync::Arc;

use async_stream::stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::{
    pipeline::{Envelope, EventStream, PipelineError, Source, SourceEvent},
    sources::telegram,
};

/// One telegram JSON object per line, e.g. stdin piped from a P1 reader.
pub struct NdjsonSource<R> {
    label: String,
    reader: Arc<tokio::sync::Mutex<Option<R>>>,
}

impl<R> NdjsonSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(label: impl Into<String>, reader: R) -> Self {
        Self {
            label: label.into(),
            reader: Arc::new(tokio::sync::Mutex::new(Some(reader))),
        }
    }
}

impl NdjsonSource<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new("stdin", tokio::io::stdin())
    }
}

#[async_trait::async_trait]
impl<R> Source for NdjsonSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn events(&self) -> EventStream {
        let reader = self.reader.lock().await.take();
        let label = self.label.clone();

        let s = stream! {
            let Some(reader) = reader else {
                yield SourceEvent::Error(PipelineError::Source(format!(
                    "{label} already consumed; only one consumer supported"
                )));
                return;
            };

            yield SourceEvent::Connected(label.clone());
            let mut lines = BufReader::new(reader).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let event = match telegram::parse_telegram(line) {
                            Ok(reading) => SourceEvent::Reading(Envelope::now(reading)),
                            Err(e) => SourceEvent::Error(e),
                        };
                        yield event;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield SourceEvent::Error(PipelineError::Source(format!(
                            "failed to read from {label}: {e}"
                        )));
                        break;
                    }
                }
            }

            yield SourceEvent::Closed;
        };

        Box::pin(s)
    }
}

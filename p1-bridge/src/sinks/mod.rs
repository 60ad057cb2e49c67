pub mod influx_http;
pub mod line_protocol;
pub mod line_tcp;
pub mod spill_file;

use std::{sync::Arc, time::Duration};

pub use influx_http::InfluxHttpClient;
pub use line_tcp::LineTcpClient;
pub use spill_file::{SpillError, SpillFile};

use crate::config::{InfluxConfig, SinkProtocol};

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Write side of the time-series database.
///
/// One call is one attempt; implementations never retry.
#[async_trait::async_trait]
pub trait SinkClient: Send + Sync {
    async fn write_lines(&self, payload: String) -> Result<(), SinkError>;
}

/// Builds the sink client selected by `influx.protocol`.
pub fn connect(cfg: &InfluxConfig) -> Result<Arc<dyn SinkClient>, SinkError> {
    let client: Arc<dyn SinkClient> = match cfg.protocol {
        SinkProtocol::Http | SinkProtocol::Https => Arc::new(InfluxHttpClient::new(cfg)?),
        SinkProtocol::Tcp => Arc::new(LineTcpClient::new(
            &cfg.host,
            cfg.port,
            Duration::from_secs(cfg.timeout_secs),
        )),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_sink_uses_the_configured_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(socket);
        });

        let cfg = InfluxConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            protocol: SinkProtocol::Tcp,
            timeout_secs: 1,
            ..InfluxConfig::default()
        };
        let client = connect(&cfg).unwrap();
        let payload = "a".repeat(32 * 1024 * 1024);

        let res = tokio::time::timeout(Duration::from_secs(8), client.write_lines(payload)).await;
        assert!(matches!(res, Ok(Err(SinkError::Io(_)))), "write hung past timeout_secs");
    }
}

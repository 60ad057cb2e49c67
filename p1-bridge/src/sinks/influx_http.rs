use std::time::Duration;

use crate::{
    config::InfluxConfig,
    sinks::{line_protocol::PRECISION, SinkClient, SinkError},
};

/// Client for the InfluxDB 1.x `/write` endpoint.
pub struct InfluxHttpClient {
    client: reqwest::Client,
    write_url: String,
    database: String,
    credentials: Option<(String, Option<String>)>,
}

impl InfluxHttpClient {
    pub fn new(cfg: &InfluxConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            write_url: format!("{}://{}:{}/write", cfg.protocol.scheme(), cfg.host, cfg.port),
            database: cfg.database.clone(),
            credentials: cfg
                .username
                .clone()
                .map(|user| (user, cfg.password.clone())),
        })
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }
}

#[async_trait::async_trait]
impl SinkClient for InfluxHttpClient {
    async fn write_lines(&self, payload: String) -> Result<(), SinkError> {
        let mut req = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str()), ("precision", PRECISION)])
            .body(payload);

        if let Some((user, password)) = &self.credentials {
            req = req.basic_auth(user, password.as_ref());
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

use anyhow::{bail, Context};
use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkProtocol {
    Http,
    Https,
    /// Line protocol over a raw TCP socket.
    Tcp,
}

impl SinkProtocol {
    pub fn scheme(self) -> &'static str {
        match self {
            SinkProtocol::Http => "http",
            SinkProtocol::Https => "https",
            SinkProtocol::Tcp => "tcp",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    pub protocol: SinkProtocol,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub measurement: String,
    pub timeout_secs: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            protocol: SinkProtocol::Http,
            database: "p1".to_string(),
            username: None,
            password: None,
            measurement: "p1-readings".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Where a failed retry batch goes back into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequeuePolicy {
    /// Back to the head, keeping strict FIFO order.
    Head,
    /// Behind anything cached since the batch was dequeued.
    Tail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_length: usize,
    pub retry_batch_size: usize,
    pub retry_interval_secs: u64,
    pub requeue: RequeuePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_length: 10_000,
            retry_batch_size: 300,
            retry_interval_secs: 60,
            requeue: RequeuePolicy::Head,
        }
    }
}

impl CacheConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Http,
    Stdin,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub http_bind_addr: String,
    pub channel_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Http,
            http_bind_addr: "0.0.0.0:8087".to_string(),
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpillPolicy {
    /// Readings evicted from the full retry cache.
    #[default]
    Evicted,
    /// Every reading whose live write failed, in addition to caching it.
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpillConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub policy: SpillPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub influx: InfluxConfig,
    pub cache: CacheConfig,
    pub source: SourceConfig,
    pub spill: Option<SpillConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("P1_BRIDGE_CONFIG").unwrap_or_else(|_| "p1-bridge.toml".to_string());
        let contents =
            fs::read_to_string(&path).with_context(|| format!("failed to read config file {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid config file {path}"))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.retry_batch_size == 0 {
            bail!("cache.retry_batch_size must be at least 1");
        }
        if self.cache.retry_interval_secs == 0 {
            bail!("cache.retry_interval_secs must be at least 1");
        }
        if self.influx.timeout_secs == 0 {
            bail!("influx.timeout_secs must be at least 1");
        }
        if self.influx.measurement.is_empty() {
            bail!("influx.measurement must not be empty");
        }
        if self.influx.database.is_empty() && self.influx.protocol != SinkProtocol::Tcp {
            bail!("influx.database must not be empty");
        }
        if self.source.channel_capacity == 0 {
            bail!("source.channel_capacity must be at least 1");
        }
        Ok(())
    }
}

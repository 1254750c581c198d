//! Collector configuration.
//!
//! Precedence: command-line flags > environment > TOML file > defaults.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [source]
//! endpoint = "/dev/ttyUSB0"
//!
//! [delivery]
//! endpoint = "tcp://127.0.0.1:8765"
//! mode = "frames"
//! overflow = "block"
//!
//! [sync]
//! feed = "log"
//! single_log = "logs/data_collection.log"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::codec::Codec;
use crate::error::{GloveError, Result};
use crate::frame::CHANNELS;
use crate::normalize::FrameNormalizer;
use crate::pipeline::DeliveryMode;
use crate::protocol::DeliveryItem;
use crate::queue::{DeliveryQueue, OverflowPolicy};
use crate::segmenter::SegmenterConfig;
use crate::sender::{SenderConfig, ShutdownPolicy};
use crate::source::LineFrameSource;
use crate::sync::{SensorFeed, SharedSeries, SyncServerConfig};
use crate::transport::Endpoint;

/// Environment variable overriding `source.endpoint`.
pub const ENV_SOURCE: &str = "GLOVELINK_SOURCE";
/// Environment variable overriding `delivery.endpoint`.
pub const ENV_CONSUMER: &str = "GLOVELINK_CONSUMER";
/// Environment variable overriding `delivery.session_id`.
pub const ENV_SESSION_ID: &str = "GLOVELINK_SESSION_ID";
/// Truthy value forces the simulated sensor feed.
pub const ENV_SENSOR_SIM: &str = "SYNC_SENSOR_SIM";

/// Floor for `sync.push_interval_ms`.
pub const MIN_PUSH_INTERVAL_MS: u64 = 100;

/// Full collector configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub normalizer: FrameNormalizer,
    pub segmenter: SegmenterConfig,
    pub delivery: DeliveryConfig,
    pub sync: SyncConfig,
}

/// `[source]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Device path, `tcp://host:port` or `unix:/path`.
    pub endpoint: String,
    /// Values per device line.
    pub channels: usize,
    pub read_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Pause after opening a device while the board resets.
    pub settle_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "/dev/ttyUSB0".to_string(),
            channels: CHANNELS,
            read_timeout_ms: 1000,
            reconnect_delay_ms: 1000,
            settle_ms: 2000,
        }
    }
}

/// What the sender does with the queue on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    #[default]
    Drain,
    Discard,
}

/// `[delivery]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub endpoint: String,
    pub session_id: String,
    pub mode: DeliveryMode,
    pub codec: Codec,
    pub batch_size: usize,
    pub batch_interval_ms: u64,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub block_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub reply_timeout_ms: u64,
    pub shutdown: ShutdownMode,
    pub drain_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://127.0.0.1:8765".to_string(),
            session_id: "demo".to_string(),
            mode: DeliveryMode::Windows,
            codec: Codec::Json,
            batch_size: 5,
            batch_interval_ms: 50,
            queue_capacity: 100,
            overflow: OverflowPolicy::DropOldest,
            block_timeout_ms: 1000,
            retry_delay_ms: 1000,
            reconnect_backoff_ms: 2000,
            reply_timeout_ms: 5000,
            shutdown: ShutdownMode::Drain,
            drain_timeout_ms: 2000,
        }
    }
}

/// Sensor series source for sync sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    #[default]
    Live,
    Log,
    Simulated,
}

/// `[sync]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub listen: String,
    pub max_points: usize,
    pub window_size: usize,
    pub sensor_k: f64,
    pub cv_k: f64,
    pub push_interval_ms: u64,
    /// Keep the last pushed payload for `replay`.
    pub cache: bool,
    pub feed: FeedKind,
    pub single_log: Option<PathBuf>,
    pub dual_log: Option<PathBuf>,
    pub log_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "tcp://127.0.0.1:8766".to_string(),
            max_points: 60,
            window_size: 20,
            sensor_k: 6.0,
            cv_k: 5.0,
            push_interval_ms: 100,
            cache: true,
            feed: FeedKind::Live,
            single_log: None,
            dual_log: None,
            log_limit: 200,
        }
    }
}

impl Config {
    /// Parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// File (if given) plus environment overrides. Not yet validated, so
    /// callers can layer flags on top first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(source) = lookup(ENV_SOURCE) {
            self.source.endpoint = source;
        }
        if let Some(consumer) = lookup(ENV_CONSUMER) {
            self.delivery.endpoint = consumer;
        }
        if let Some(session_id) = lookup(ENV_SESSION_ID) {
            self.delivery.session_id = session_id;
        }
        if lookup(ENV_SENSOR_SIM).as_deref().is_some_and(truthy) {
            self.sync.feed = FeedKind::Simulated;
        }
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<()> {
        self.normalizer.validate()?;
        self.segmenter.validate()?;

        if self.source.channels == 0 {
            return Err(invalid("source.channels must be at least 1"));
        }
        let delivery = &self.delivery;
        if delivery.batch_size == 0 {
            return Err(invalid("delivery.batch_size must be at least 1"));
        }
        if delivery.queue_capacity < delivery.batch_size {
            return Err(GloveError::Config(format!(
                "delivery.queue_capacity ({}) must be at least delivery.batch_size ({})",
                delivery.queue_capacity, delivery.batch_size
            )));
        }
        Endpoint::parse(&delivery.endpoint)?;

        let sync = &self.sync;
        if sync.window_size == 0 {
            return Err(invalid("sync.window_size must be at least 1"));
        }
        if sync.max_points == 0 {
            return Err(invalid("sync.max_points must be at least 1"));
        }
        if !sync.sensor_k.is_finite() || !sync.cv_k.is_finite() {
            return Err(invalid("sync.sensor_k and sync.cv_k must be finite"));
        }
        if sync.push_interval_ms < MIN_PUSH_INTERVAL_MS {
            return Err(GloveError::Config(format!(
                "sync.push_interval_ms ({}) must be at least {MIN_PUSH_INTERVAL_MS}",
                sync.push_interval_ms
            )));
        }
        if sync.enabled {
            Endpoint::parse(&sync.listen)?;
        }
        Ok(())
    }

    pub fn consumer_endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.delivery.endpoint)
    }

    pub fn sync_endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.sync.listen)
    }

    /// Frame source for `source.endpoint`.
    pub fn frame_source(&self) -> Result<LineFrameSource> {
        let source = &self.source;
        Ok(LineFrameSource::open(&source.endpoint)?
            .with_width(source.channels)
            .with_read_timeout(Duration::from_millis(source.read_timeout_ms))
            .with_settle(Duration::from_millis(source.settle_ms)))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.source.reconnect_delay_ms)
    }

    pub fn queue(&self) -> DeliveryQueue<DeliveryItem> {
        let d = &self.delivery;
        DeliveryQueue::with_timeout(
            d.queue_capacity,
            d.overflow,
            Duration::from_millis(d.block_timeout_ms),
        )
    }

    pub fn sender_config(&self) -> SenderConfig {
        let d = &self.delivery;
        let shutdown = match d.shutdown {
            ShutdownMode::Drain => ShutdownPolicy::Drain {
                timeout: Duration::from_millis(d.drain_timeout_ms),
            },
            ShutdownMode::Discard => ShutdownPolicy::Discard,
        };
        SenderConfig {
            session_id: d.session_id.clone(),
            codec: d.codec,
            batch_size: d.batch_size,
            batch_interval: Duration::from_millis(d.batch_interval_ms),
            retry_delay: Duration::from_millis(d.retry_delay_ms),
            reconnect_backoff: Duration::from_millis(d.reconnect_backoff_ms),
            reply_timeout: Duration::from_millis(d.reply_timeout_ms),
            shutdown,
        }
    }

    pub fn sync_server_config(&self) -> SyncServerConfig {
        let s = &self.sync;
        SyncServerConfig {
            max_points: s.max_points,
            window_size: s.window_size,
            sensor_k: s.sensor_k,
            cv_k: s.cv_k,
            push_interval: Duration::from_millis(s.push_interval_ms),
        }
    }

    /// The configured feed. `live` is used only for [`FeedKind::Live`].
    pub fn sensor_feed(&self, live: &SharedSeries) -> SensorFeed {
        match self.sync.feed {
            FeedKind::Live => SensorFeed::Live(live.clone()),
            FeedKind::Log => SensorFeed::Log {
                single: self.sync.single_log.clone(),
                dual: self.sync.dual_log.clone(),
                limit: self.sync.log_limit,
            },
            FeedKind::Simulated => SensorFeed::Simulated,
        }
    }
}

fn invalid(message: &str) -> GloveError {
    GloveError::Config(message.to_string())
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delivery.batch_size, 5);
        assert_eq!(config.delivery.queue_capacity, 100);
        assert_eq!(config.segmenter.min_length, 10);
        assert_eq!(config.normalizer.accel_divisor, 16384.0);
        assert_eq!(config.sync.max_points, 60);
        assert_eq!(config.source.settle_ms, 2000);
    }

    #[test]
    fn test_empty_and_partial_toml() {
        let empty = Config::from_toml("").unwrap();
        assert_eq!(empty.delivery.session_id, "demo");

        let config = Config::from_toml(
            r#"
            [source]
            endpoint = "tcp://10.0.0.2:7000"

            [segmenter]
            min_length = 4

            [delivery]
            mode = "frames"
            codec = "msgpack"
            overflow = "block"
            shutdown = "discard"

            [sync]
            feed = "log"
            single_log = "logs/data_collection.log"
            "#,
        )
        .unwrap();
        assert_eq!(config.source.endpoint, "tcp://10.0.0.2:7000");
        assert_eq!(config.source.channels, CHANNELS);
        assert_eq!(config.segmenter.min_length, 4);
        assert_eq!(config.segmenter.window_size, 5);
        assert_eq!(config.delivery.mode, DeliveryMode::Frames);
        assert_eq!(config.delivery.codec, Codec::MsgPack);
        assert_eq!(config.delivery.overflow, OverflowPolicy::Block);
        assert_eq!(config.sender_config().shutdown, ShutdownPolicy::Discard);
        assert_eq!(config.sync.feed, FeedKind::Log);
        assert!(matches!(
            config.sensor_feed(&SharedSeries::new(1)),
            SensorFeed::Log { single: Some(_), dual: None, limit: 200 }
        ));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            Config::from_toml("[delivery]\nbatch_size = \"five\""),
            Err(GloveError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_SOURCE, "tcp://192.168.4.1:9000"),
            (ENV_CONSUMER, "unix:/tmp/consumer.sock"),
            (ENV_SESSION_ID, "lab-7"),
            (ENV_SENSOR_SIM, " Yes "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_with(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.source.endpoint, "tcp://192.168.4.1:9000");
        assert_eq!(config.delivery.endpoint, "unix:/tmp/consumer.sock");
        assert_eq!(config.sender_config().session_id, "lab-7");
        assert_eq!(config.sync.feed, FeedKind::Simulated);
    }

    #[test]
    fn test_sim_flag_must_be_truthy() {
        let mut config = Config::default();
        config.apply_env_with(|name| (name == ENV_SENSOR_SIM).then(|| "0".to_string()));
        assert_eq!(config.sync.feed, FeedKind::Live);
    }

    #[test]
    fn test_validation_failures() {
        let mut c = Config::default();
        c.delivery.batch_size = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.delivery.queue_capacity = 3;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.normalizer.gyro_divisor = 0.0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.sync.cv_k = f64::NAN;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.sync.window_size = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.sync.push_interval_ms = 20;
        assert!(c.validate().is_err());
        c.sync.push_interval_ms = MIN_PUSH_INTERVAL_MS;
        assert!(c.validate().is_ok());

        let mut c = Config::default();
        c.delivery.endpoint = "nowhere".to_string();
        assert!(c.validate().is_err());

        // A bad listen address only matters when sync is on.
        let mut c = Config::default();
        c.sync.listen = "nowhere".to_string();
        assert!(c.validate().is_err());
        c.sync.enabled = false;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_component_conversions() {
        let config = Config::default();
        let sender = config.sender_config();
        assert_eq!(sender.batch_interval, Duration::from_millis(50));
        assert_eq!(sender.reconnect_backoff, Duration::from_secs(2));
        assert_eq!(
            sender.shutdown,
            ShutdownPolicy::Drain {
                timeout: Duration::from_secs(2)
            }
        );

        assert_eq!(config.queue().capacity(), 100);
        assert_eq!(config.sync_server_config().push_interval, Duration::from_millis(100));
        assert!(matches!(config.sensor_feed(&SharedSeries::new(1)), SensorFeed::Live(_)));
        assert!(config.frame_source().is_ok());
        assert_eq!(
            config.consumer_endpoint().unwrap(),
            Endpoint::Tcp("127.0.0.1:8765".to_string())
        );
    }
}

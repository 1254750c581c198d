//! Sensor/vision stream synchronization.
//!
//! - Bounded time series and the rolling-window spike detector
//! - Per-session CV ring and cross-stream offset
//! - Sensor feeds (live, log tail, simulated)
//! - The sync stream server with its optional replay cache

mod buffer;
mod cache;
mod feed;
mod server;
mod series;
mod spike;

pub use buffer::{SyncBuffer, SyncOffset, DEFAULT_CV_K, DEFAULT_MAX_POINTS, DEFAULT_SENSOR_K};
pub use cache::SyncCache;
pub use feed::{parse_log_line, SensorFeed, DEFAULT_LOG_LIMIT};
pub use server::{SyncServer, SyncServerConfig, DEFAULT_PUSH_INTERVAL};
pub use series::{now_epoch_ms, Sample, SharedSeries, TimeSeries};
pub use spike::{detect, SpikeDetector, SpikeEvent, DEFAULT_WINDOW_SIZE};

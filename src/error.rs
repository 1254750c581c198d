//! Error types for glovelink.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all glovelink operations.
#[derive(Debug, Error)]
pub enum GloveError {
    /// I/O error during device, socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// CSV reader error (file level, not a single bad cell).
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration is structurally valid but unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A recorded log is missing a column the caller requires.
    #[error("{} is missing required column `{column}`", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// Protocol error (bad header, unknown packet kind, oversize payload).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Peer did not answer in time.
    #[error("Timed out waiting for peer")]
    Timeout,

    /// Delivery queue is at capacity.
    #[error("Delivery queue full")]
    Backpressure,

    /// Delivery queue no longer accepts entries.
    #[error("Delivery queue closed")]
    QueueClosed,
}

/// Result type alias using GloveError.
pub type Result<T> = std::result::Result<T, GloveError>;

//! Typed packet payloads.
//!
//! Delivery link (collector → consumer): [`BatchRef`] out, [`DeliveryReply`]
//! back. Sync link (client ↔ sync server): [`SyncRequest`] in,
//! [`SyncResponse`] out, both tagged on a `type` field.

use serde::{Deserialize, Serialize, Serializer};

use crate::frame::{GestureWindow, NormalizedFrame};

/// One queued unit of delivery.
///
/// Untagged on the wire: a window is an array of frames, a frame is an
/// array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveryItem {
    Window(GestureWindow),
    Frame(NormalizedFrame),
}

impl DeliveryItem {
    /// Number of frames carried.
    pub fn frame_count(&self) -> usize {
        match self {
            DeliveryItem::Window(w) => w.len(),
            DeliveryItem::Frame(_) => 1,
        }
    }
}

/// Batch payload borrowing the in-flight items.
#[derive(Debug, Serialize)]
pub struct BatchRef<'a, T> {
    pub sensor_values: &'a [T],
    pub session_id: &'a str,
}

/// Owned batch payload, as a consumer decodes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch<T> {
    pub sensor_values: Vec<T>,
    pub session_id: String,
}

/// Consumer answer to one batch. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What a reply means for this send cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Prediction {
        label: serde_json::Value,
        confidence: Option<f64>,
    },
    NoResult {
        status: Option<String>,
        message: Option<String>,
    },
}

impl DeliveryReply {
    /// A successful prediction reply.
    pub fn prediction(label: impl Into<serde_json::Value>, confidence: f64) -> Self {
        Self {
            status: Some("success".to_string()),
            prediction: Some(label.into()),
            confidence: Some(confidence),
            message: None,
        }
    }

    /// Classify the reply: `status` absent or `"success"` with a non-null
    /// prediction is a result; anything else is no result.
    pub fn outcome(&self) -> ReplyOutcome {
        let ok_status = self.status.as_deref().map_or(true, |s| s == "success");
        match &self.prediction {
            Some(label) if ok_status && !label.is_null() => ReplyOutcome::Prediction {
                label: label.clone(),
                confidence: self.confidence,
            },
            _ => ReplyOutcome::NoResult {
                status: self.status.clone(),
                message: self.message.clone(),
            },
        }
    }
}

/// Which capture the sync stream is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Single,
    Dual,
}

impl SyncMode {
    /// Parse a client-supplied mode; anything unrecognised is `Single`.
    pub fn parse_lenient(mode: &str) -> Self {
        if mode.eq_ignore_ascii_case("dual") {
            SyncMode::Dual
        } else {
            SyncMode::Single
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Single => "single",
            SyncMode::Dual => "dual",
        }
    }
}

/// Client → sync server.
///
/// A request without a `type` field is a `cv_sample`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    try_from = "RawSyncRequest"
)]
pub enum SyncRequest {
    Configure {
        #[serde(default)]
        mode: Option<String>,
    },
    CvSample {
        #[serde(default)]
        velocity: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<f64>,
    },
    Tick,
    Latest,
    Replay,
}

/// Flat wire view of a [`SyncRequest`] with an optional tag.
#[derive(Deserialize)]
struct RawSyncRequest {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    velocity: Option<f64>,
    #[serde(default)]
    timestamp_ms: Option<f64>,
}

impl TryFrom<RawSyncRequest> for SyncRequest {
    type Error = String;

    fn try_from(raw: RawSyncRequest) -> Result<Self, Self::Error> {
        match raw.kind.as_deref().unwrap_or("cv_sample") {
            "configure" => Ok(SyncRequest::Configure { mode: raw.mode }),
            "cv_sample" => Ok(SyncRequest::CvSample {
                velocity: raw.velocity,
                timestamp_ms: raw.timestamp_ms,
            }),
            "tick" => Ok(SyncRequest::Tick),
            "latest" => Ok(SyncRequest::Latest),
            "replay" => Ok(SyncRequest::Replay),
            other => Err(format!("unknown sync request type `{other}`")),
        }
    }
}

/// Series plus its spike statistics, as pushed to sync clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub series: Vec<f64>,
    pub threshold: Option<f64>,
    /// Index of the confirming point, or -1.
    #[serde(serialize_with = "index_or_minus_one", deserialize_with = "minus_one_as_none")]
    pub spike_index: Option<usize>,
    pub spike_active: bool,
}

/// Joint view of both streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSeries {
    pub mode: SyncMode,
    pub sensor: SeriesStats,
    pub cv: SeriesStats,
    /// Sensor spike time minus CV spike time, when both spiked.
    pub offset_ms: Option<f64>,
}

/// Sync server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncResponse {
    Ack { mode: SyncMode },
    SyncSeries(SyncSeries),
    LatestFrame { values: Vec<f32>, real_sensor: bool },
    Error { message: String },
}

fn index_or_minus_one<S: Serializer>(index: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
    match index {
        Some(i) => s.serialize_i64(*i as i64),
        None => s.serialize_i64(-1),
    }
}

fn minus_one_as_none<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
    let raw = i64::deserialize(d)?;
    Ok(usize::try_from(raw).ok())
}

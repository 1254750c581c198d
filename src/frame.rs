//! Sensor frame types and the line format produced by the glove firmware.
//!
//! One frame is one sample of every channel at one instant:
//!
//! ```text
//! ┌───────────────────────────┬──────────────┬──────────────┐
//! │ flex 0..5                 │ accel 5..8   │ gyro 8..11   │
//! │ ADC counts (0-4095)       │ raw LSB      │ raw LSB      │
//! └───────────────────────────┴──────────────┴──────────────┘
//! ```
//!
//! The device writes one frame per line as comma-separated decimals.
//!
//! # Example
//!
//! ```
//! use glovelink::frame::{parse_line, Frame, CHANNELS};
//!
//! let values = parse_line("1,2,3,4,5,6,7,8,9,10,11", CHANNELS).unwrap();
//! let (frame, adjusted) = Frame::conform(&values);
//! assert!(!adjusted);
//! assert_eq!(frame.values()[10], 11.0);
//! ```

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Number of channels in one frame.
pub const CHANNELS: usize = 11;

/// Flex sensor channels.
pub const FLEX: Range<usize> = 0..5;

/// Accelerometer channels (x, y, z).
pub const ACCEL: Range<usize> = 5..8;

/// Gyroscope channels (x, y, z).
pub const GYRO: Range<usize> = 8..11;

/// Parse one device line into exactly `width` finite values.
///
/// Returns `None` for an empty line, a wrong number of cells, a cell that is
/// not a number, or a non-finite value. Cells are trimmed before parsing.
pub fn parse_line(line: &str, width: usize) -> Option<Vec<f32>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut values = Vec::with_capacity(width);
    for cell in line.split(',') {
        let value: f32 = cell.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        values.push(value);
    }

    if values.len() != width {
        return None;
    }
    Some(values)
}

/// One raw sample of all channels, in device units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame([f32; CHANNELS]);

impl Frame {
    /// Create a frame from exactly `CHANNELS` values.
    pub fn new(values: [f32; CHANNELS]) -> Self {
        Self(values)
    }

    /// Build a frame from any number of values.
    ///
    /// Short input is padded with `0.0`, long input is truncated. The flag is
    /// `true` when the input width was not `CHANNELS`.
    pub fn conform(values: &[f32]) -> (Self, bool) {
        let mut out = [0.0f32; CHANNELS];
        let n = values.len().min(CHANNELS);
        out[..n].copy_from_slice(&values[..n]);
        (Self(out), values.len() != CHANNELS)
    }

    /// Channel values.
    #[inline]
    pub fn values(&self) -> &[f32; CHANNELS] {
        &self.0
    }
}

/// A frame rescaled into physical units (flex fraction, g, deg/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedFrame([f32; CHANNELS]);

impl NormalizedFrame {
    /// Wrap already-normalized values.
    pub fn new(values: [f32; CHANNELS]) -> Self {
        Self(values)
    }

    /// Channel values.
    #[inline]
    pub fn values(&self) -> &[f32; CHANNELS] {
        &self.0
    }

    /// Magnitude of the acceleration vector, in g.
    pub fn accel_magnitude(&self) -> f64 {
        self.0[ACCEL]
            .iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt()
    }
}

/// The frames spanning one detected movement, in arrival order.
///
/// Only the segmenter builds windows; once emitted a window is never
/// modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureWindow(Vec<NormalizedFrame>);

impl GestureWindow {
    pub(crate) fn from_frames(frames: Vec<NormalizedFrame>) -> Self {
        Self(frames)
    }

    /// Frames in the window.
    #[inline]
    pub fn frames(&self) -> &[NormalizedFrame] {
        &self.0
    }

    /// Number of frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the window holds no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for GestureWindow {
    type Item = NormalizedFrame;
    type IntoIter = std::vec::IntoIter<NormalizedFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

//! Per-channel-group rescaling of raw device units into physical units.
//!
//! The glove reports flex sensors as 12-bit ADC counts, the accelerometer at
//! ±2 g full scale (16384 LSB/g) and the gyroscope at ±250 deg/s
//! (131 LSB/(deg/s)). Normalization divides each channel group by its fixed
//! divisor; it holds no state and never mutates its input.

use serde::Deserialize;

use crate::error::{GloveError, Result};
use crate::frame::{Frame, NormalizedFrame, ACCEL, CHANNELS, FLEX, GYRO};

/// Flex ADC full scale.
pub const DEFAULT_FLEX_DIVISOR: f32 = 4095.0;

/// Accelerometer LSB per g.
pub const DEFAULT_ACCEL_DIVISOR: f32 = 16384.0;

/// Gyroscope LSB per deg/s.
pub const DEFAULT_GYRO_DIVISOR: f32 = 131.0;

/// Divisors for the three channel groups.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameNormalizer {
    pub flex_divisor: f32,
    pub accel_divisor: f32,
    pub gyro_divisor: f32,
}

impl FrameNormalizer {
    /// Create a normalizer with explicit divisors.
    pub fn new(flex_divisor: f32, accel_divisor: f32, gyro_divisor: f32) -> Self {
        Self {
            flex_divisor,
            accel_divisor,
            gyro_divisor,
        }
    }

    /// A normalizer that leaves every value unchanged.
    pub fn identity() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    /// Reject zero, negative or non-finite divisors.
    pub fn validate(&self) -> Result<()> {
        for (name, d) in [
            ("flex_divisor", self.flex_divisor),
            ("accel_divisor", self.accel_divisor),
            ("gyro_divisor", self.gyro_divisor),
        ] {
            if !(d.is_finite() && d > 0.0) {
                return Err(GloveError::Config(format!(
                    "normalizer.{} must be a positive number, got {}",
                    name, d
                )));
            }
        }
        Ok(())
    }

    /// Rescale one frame.
    pub fn normalize(&self, frame: &Frame) -> NormalizedFrame {
        let mut out = *frame.values();
        scale(&mut out, FLEX, self.flex_divisor);
        scale(&mut out, ACCEL, self.accel_divisor);
        scale(&mut out, GYRO, self.gyro_divisor);
        NormalizedFrame::new(out)
    }
}

impl Default for FrameNormalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_FLEX_DIVISOR,
            DEFAULT_ACCEL_DIVISOR,
            DEFAULT_GYRO_DIVISOR,
        )
    }
}

#[inline]
fn scale(values: &mut [f32; CHANNELS], range: std::ops::Range<usize>, divisor: f32) {
    for v in &mut values[range] {
        *v /= divisor;
    }
}

//! Movement segmentation.
//!
//! Splits the continuous frame stream into gesture windows using the
//! per-channel variance of a short trailing buffer:
//!
//! ```text
//!            is_moving                      !is_moving
//!   ┌──────┐ ─────────────────────────────► ┌────────┐
//!   │ Idle │                                │ Active │  append frame
//!   └──────┘ ◄───────────────────────────── └────────┘
//!             emit window if len >= min_length
//! ```
//!
//! The trailing buffer must be full before any decision is made, so both
//! edges lag the motion by up to `window_size` frames. The frame on which
//! motion stops belongs to the idle stretch, not to the window.

use std::collections::VecDeque;

use serde::Deserialize;

use crate::error::{GloveError, Result};
use crate::frame::{GestureWindow, NormalizedFrame, CHANNELS};

/// Default variance threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// Default trailing buffer length.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Default minimum gesture length.
pub const DEFAULT_MIN_LENGTH: usize = 10;

/// Segmenter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Per-channel variance above which the hand counts as moving.
    pub threshold: f64,
    /// Frames in the trailing variance buffer.
    pub window_size: usize,
    /// Shorter movements are discarded as noise.
    pub min_length: usize,
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(GloveError::Config(format!(
                "segmenter.threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if self.window_size == 0 {
            return Err(GloveError::Config(
                "segmenter.window_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

/// Segmentation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Active,
}

/// Variance-based Idle/Active segmenter.
#[derive(Debug)]
pub struct MovementSegmenter {
    config: SegmenterConfig,
    recent: VecDeque<NormalizedFrame>,
    current: Vec<NormalizedFrame>,
    state: MotionState,
}

impl MovementSegmenter {
    /// Create a segmenter in the Idle state.
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            recent: VecDeque::with_capacity(config.window_size + 1),
            current: Vec::new(),
            state: MotionState::Idle,
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Frames collected so far for the movement in progress.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.current.len()
    }

    /// Feed one frame.
    ///
    /// Returns the finished window on the Active→Idle transition when it is
    /// long enough; `None` otherwise.
    pub fn update(&mut self, frame: NormalizedFrame) -> Option<GestureWindow> {
        self.recent.push_back(frame);
        if self.recent.len() > self.config.window_size {
            self.recent.pop_front();
        }
        if self.recent.len() < self.config.window_size {
            return None;
        }

        let moving = self.is_moving();
        match (self.state, moving) {
            (MotionState::Idle, true) => {
                self.state = MotionState::Active;
                self.current.clear();
                self.current.push(frame);
                None
            }
            (MotionState::Active, true) => {
                self.current.push(frame);
                None
            }
            (MotionState::Active, false) => {
                self.state = MotionState::Idle;
                let frames = std::mem::take(&mut self.current);
                if frames.len() >= self.config.min_length {
                    Some(GestureWindow::from_frames(frames))
                } else {
                    tracing::debug!(
                        "Discarding {}-frame movement (min {})",
                        frames.len(),
                        self.config.min_length
                    );
                    None
                }
            }
            (MotionState::Idle, false) => None,
        }
    }

    /// Drop all buffered frames and return to Idle.
    pub fn reset(&mut self) {
        self.recent.clear();
        self.current.clear();
        self.state = MotionState::Idle;
    }

    fn is_moving(&self) -> bool {
        let n = self.recent.len() as f64;
        (0..CHANNELS).any(|ch| {
            let mean = self
                .recent
                .iter()
                .map(|f| f64::from(f.values()[ch]))
                .sum::<f64>()
                / n;
            let variance = self
                .recent
                .iter()
                .map(|f| {
                    let d = f64::from(f.values()[ch]) - mean;
                    d * d
                })
                .sum::<f64>()
                / n;
            variance > self.config.threshold
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> NormalizedFrame {
        NormalizedFrame::new([0.0; CHANNELS])
    }

    fn bump(value: f32) -> NormalizedFrame {
        let mut v = [0.0; CHANNELS];
        v[0] = value;
        NormalizedFrame::new(v)
    }

    fn feed(seg: &mut MovementSegmenter, frames: &[NormalizedFrame]) -> Vec<GestureWindow> {
        frames.iter().filter_map(|f| seg.update(*f)).collect()
    }

    #[test]
    fn test_no_decision_until_buffer_full() {
        let mut seg = MovementSegmenter::new(SegmenterConfig::default());
        for i in 0..4 {
            assert!(seg.update(bump(i as f32)).is_none());
            assert_eq!(seg.state(), MotionState::Idle);
            assert_eq!(seg.pending_len(), 0);
        }
    }

    #[test]
    fn test_quiet_stream_never_emits() {
        let mut seg = MovementSegmenter::new(SegmenterConfig::default());
        // Small jitter well below the threshold.
        let frames: Vec<_> = (0..500).map(|i| bump((i % 3) as f32 * 0.01)).collect();
        assert!(feed(&mut seg, &frames).is_empty());
        assert_eq!(seg.state(), MotionState::Idle);
    }

    #[test]
    fn test_exact_min_length_movement() {
        let mut seg = MovementSegmenter::new(SegmenterConfig::default());

        // Two bumps five frames apart keep the variance high for exactly
        // ten updates (each bump stays in the trailing buffer for five).
        let mut frames = vec![flat(); 5];
        frames.push(bump(1.0));
        frames.extend(vec![flat(); 4]);
        frames.push(bump(1.0));
        frames.extend(vec![flat(); 10]);

        let windows = feed(&mut seg, &frames);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), DEFAULT_MIN_LENGTH);
        assert_eq!(windows[0].frames()[0], bump(1.0));
        assert_eq!(windows[0].frames()[5], bump(1.0));
        assert_eq!(seg.state(), MotionState::Idle);
    }

    #[test]
    fn test_short_burst_discarded() {
        let mut seg = MovementSegmenter::new(SegmenterConfig::default());

        let mut frames = vec![flat(); 5];
        frames.extend(vec![bump(1.0); 3]);
        frames.extend(vec![flat(); 10]);

        assert!(feed(&mut seg, &frames).is_empty());
        assert_eq!(seg.pending_len(), 0);
    }

    #[test]
    fn test_long_movement_then_second_movement() {
        let config = SegmenterConfig {
            threshold: 0.01,
            window_size: 5,
            min_length: 10,
        };
        let mut seg = MovementSegmenter::new(config);

        let mut frames = vec![flat(); 5];
        frames.extend((0..30).map(|i| bump(if i % 2 == 0 { 1.0 } else { -1.0 })));
        frames.extend(vec![flat(); 10]);
        frames.extend((0..20).map(|i| bump(if i % 2 == 0 { 2.0 } else { 0.0 })));
        frames.extend(vec![flat(); 10]);

        let windows = feed(&mut seg, &frames);
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|w| w.len() >= 10));
    }

    #[test]
    fn test_reset() {
        let mut seg = MovementSegmenter::new(SegmenterConfig::default());
        let mut frames = vec![flat(); 5];
        frames.push(bump(1.0));
        feed(&mut seg, &frames);
        assert_eq!(seg.state(), MotionState::Active);

        seg.reset();
        assert_eq!(seg.state(), MotionState::Idle);
        assert_eq!(seg.pending_len(), 0);
    }

    #[test]
    fn test_config_validate() {
        assert!(SegmenterConfig::default().validate().is_ok());
        let bad = SegmenterConfig {
            window_size: 0,
            ..SegmenterConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}

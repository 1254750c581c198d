//! Rolling-window spike detection.
//!
//! A spike is confirmed when the last two raw values both exceed
//! `mean + k·σ` of the series tail (population σ over the last
//! `window_size` values, the confirming points included). One high sample
//! alone never counts.

use crate::protocol::SeriesStats;

/// Default tail length for the statistics.
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Result of one detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeEvent {
    /// `None` when there was nothing to compute it from.
    pub threshold: Option<f64>,
    /// Index of the confirming (last) point when active.
    pub index: Option<usize>,
    pub active: bool,
}

impl SpikeEvent {
    const NONE: SpikeEvent = SpikeEvent {
        threshold: None,
        index: None,
        active: false,
    };

    /// Attach the series the event was computed on.
    pub fn into_stats(self, series: Vec<f64>) -> SeriesStats {
        SeriesStats {
            series,
            threshold: self.threshold,
            spike_index: self.index,
            spike_active: self.active,
        }
    }
}

/// Detect a confirmed spike at the end of `series`.
///
/// An empty series or a zero window is "no signal": no threshold, inactive.
pub fn detect(series: &[f64], k: f64, window_size: usize) -> SpikeEvent {
    if series.is_empty() || window_size == 0 {
        return SpikeEvent::NONE;
    }

    let window = &series[series.len().saturating_sub(window_size)..];
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let threshold = mean + k * variance.sqrt();

    let last = series.len() - 1;
    let active = series.len() >= 2 && series[last] > threshold && series[last - 1] > threshold;

    SpikeEvent {
        threshold: Some(threshold),
        index: active.then_some(last),
        active,
    }
}

/// [`detect`] with fixed parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeDetector {
    pub k: f64,
    pub window_size: usize,
}

impl SpikeDetector {
    pub fn new(k: f64, window_size: usize) -> Self {
        Self { k, window_size }
    }

    #[inline]
    pub fn detect(&self, series: &[f64]) -> SpikeEvent {
        detect(series, self.k, self.window_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_series_never_spikes() {
        for v in [0.0, 1.0, 42.5] {
            let series = vec![v; 30];
            for k in [0.1, 1.0, 6.0] {
                let e = detect(&series, k, 20);
                assert!(!e.active);
                assert_eq!(e.index, None);
                assert_eq!(e.threshold, Some(v));
            }
        }
    }

    #[test]
    fn test_two_point_spike_confirmed() {
        let mut series = vec![1.0; 19];
        series.extend([9.0, 9.0]);
        let e = detect(&series, 2.0, 20);
        assert!(e.active);
        assert_eq!(e.index, Some(20));
        assert!(e.threshold.unwrap() < 9.0);
    }

    #[test]
    fn test_single_sample_not_confirmed() {
        let mut series = vec![1.0; 20];
        series.push(9.0);
        let e = detect(&series, 2.0, 20);
        assert!(!e.active);
        assert_eq!(e.index, None);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(detect(&[], 5.0, 20), SpikeEvent::NONE);
        assert_eq!(detect(&[1.0, 2.0], 5.0, 0), SpikeEvent::NONE);

        let one = detect(&[3.0], 5.0, 20);
        assert_eq!(one.threshold, Some(3.0));
        assert!(!one.active);
    }

    #[test]
    fn test_window_uses_tail_only() {
        // A large early excursion falls out of the window.
        let mut series = vec![100.0; 5];
        series.extend(vec![1.0; 10]);
        let e = detect(&series, 1.0, 10);
        assert_eq!(e.threshold, Some(1.0));
    }

    #[test]
    fn test_detector_and_stats() {
        let d = SpikeDetector::new(2.0, 20);
        let mut series = vec![1.0; 19];
        series.extend([9.0, 9.0]);
        let stats = d.detect(&series).into_stats(series.clone());
        assert!(stats.spike_active);
        assert_eq!(stats.spike_index, Some(20));
        assert_eq!(stats.series.len(), 21);
    }
}

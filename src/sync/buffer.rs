//! Live CV series plus the two spike detectors.

use crate::protocol::{SyncMode, SyncSeries};

use super::series::{now_epoch_ms, TimeSeries};
use super::spike::{SpikeDetector, SpikeEvent, DEFAULT_WINDOW_SIZE};

/// Default number of retained points per series.
pub const DEFAULT_MAX_POINTS: usize = 60;

/// Default `k` for the sensor-magnitude series.
pub const DEFAULT_SENSOR_K: f64 = 6.0;

/// Default `k` for the CV velocity series.
pub const DEFAULT_CV_K: f64 = 5.0;

/// Sensor spike time minus CV spike time, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOffset(pub f64);

impl SyncOffset {
    /// Offset between two confirmed spikes, if both are active and both
    /// confirming points carry a timestamp.
    pub fn between(
        sensor: &TimeSeries,
        sensor_event: &SpikeEvent,
        cv: &TimeSeries,
        cv_event: &SpikeEvent,
    ) -> Option<Self> {
        let sensor_t = spike_time(sensor, sensor_event)?;
        let cv_t = spike_time(cv, cv_event)?;
        Some(SyncOffset(sensor_t - cv_t))
    }

    #[inline]
    pub fn ms(self) -> f64 {
        self.0
    }
}

fn spike_time(series: &TimeSeries, event: &SpikeEvent) -> Option<f64> {
    if !event.active {
        return None;
    }
    series.get(event.index?)?.time_ms
}

/// CV velocity ring and detector settings for one sync session.
#[derive(Debug, Clone)]
pub struct SyncBuffer {
    cv: TimeSeries,
    sensor_detector: SpikeDetector,
    cv_detector: SpikeDetector,
}

impl SyncBuffer {
    /// Defaults: k 6.0 (sensor) / 5.0 (CV), window 20.
    pub fn new(max_points: usize) -> Self {
        Self::with_params(max_points, DEFAULT_WINDOW_SIZE, DEFAULT_SENSOR_K, DEFAULT_CV_K)
    }

    pub fn with_params(max_points: usize, window_size: usize, sensor_k: f64, cv_k: f64) -> Self {
        Self {
            cv: TimeSeries::new(max_points),
            sensor_detector: SpikeDetector::new(sensor_k, window_size),
            cv_detector: SpikeDetector::new(cv_k, window_size),
        }
    }

    /// Record a velocity stamped with the arrival time. Non-finite values
    /// are ignored; returns whether the sample was kept.
    pub fn add_cv_sample(&mut self, velocity: f64) -> bool {
        self.add_cv_sample_at(now_epoch_ms(), velocity)
    }

    pub fn add_cv_sample_at(&mut self, time_ms: f64, velocity: f64) -> bool {
        if !velocity.is_finite() {
            return false;
        }
        self.cv.push_at(time_ms, velocity);
        true
    }

    pub fn cv_series(&self) -> &TimeSeries {
        &self.cv
    }

    pub fn sensor_stats(&self, series: &[f64]) -> SpikeEvent {
        self.sensor_detector.detect(series)
    }

    pub fn cv_stats(&self) -> SpikeEvent {
        self.cv_detector.detect(&self.cv.values())
    }

    /// Joint view for a push to sync clients.
    pub fn snapshot(&self, mode: SyncMode, sensor: &TimeSeries) -> SyncSeries {
        let sensor_values = sensor.values();
        let cv_values = self.cv.values();
        let sensor_event = self.sensor_detector.detect(&sensor_values);
        let cv_event = self.cv_detector.detect(&cv_values);
        let offset = SyncOffset::between(sensor, &sensor_event, &self.cv, &cv_event);

        SyncSeries {
            mode,
            sensor: sensor_event.into_stats(sensor_values),
            cv: cv_event.into_stats(cv_values),
            offset_ms: offset.map(SyncOffset::ms),
        }
    }
}

impl Default for SyncBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

//! Offline spike alignment between a CV log and one or two sensor logs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GloveError, Result};
use crate::protocol::SyncMode;

use super::log::CsvLog;
use super::series::{
    cv_velocity_series, detect_first_spike, sensor_magnitude_dual, sensor_magnitude_single, Hand,
    TimedSeries,
};

/// Default report file name.
pub const DEFAULT_REPORT_PATH: &str = "sync_metadata.json";

/// Column marking a combined dual-hand log.
const COMBINED_MARKER: &str = "left_acc_1";

/// Which sensor logs to align against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentSources {
    /// One single-hand log.
    Single(PathBuf),
    /// One log carrying both hands (`left_acc_*`, `right_acc_*`).
    DualCombined(PathBuf),
    /// One single-hand style log per hand.
    DualSplit { left: PathBuf, right: PathBuf },
}

impl AlignmentSources {
    /// Resolve command-line style arguments.
    ///
    /// `sensor` wins when given. Otherwise `left` is required; it is a
    /// combined log if its header has `left_acc_1`, else `right` is
    /// required too.
    pub fn resolve(
        sensor: Option<PathBuf>,
        left: Option<PathBuf>,
        right: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(sensor) = sensor {
            return Ok(AlignmentSources::Single(sensor));
        }
        let Some(left) = left else {
            return Err(GloveError::Config(
                "no sensor log given: provide a single-hand log or a left-hand log".to_string(),
            ));
        };

        let headers = CsvLog::headers_of(&left)?;
        if headers.iter().any(|h| h == COMBINED_MARKER) {
            return Ok(AlignmentSources::DualCombined(left));
        }
        match right {
            Some(right) => Ok(AlignmentSources::DualSplit { left, right }),
            None => Err(GloveError::Config(format!(
                "{} has no {} column and no right-hand log was given",
                left.display(),
                COMBINED_MARKER
            ))),
        }
    }

    pub fn mode(&self) -> SyncMode {
        match self {
            AlignmentSources::Single(_) => SyncMode::Single,
            _ => SyncMode::Dual,
        }
    }
}

/// Result of one alignment run.
///
/// Offsets are sensor spike time minus CV spike time and are left out of
/// the JSON when either side has no spike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub cv_sync_timestamp_ms: Option<f64>,
    pub sensor_mode: SyncMode,
    pub sensor_left_sync_timestamp_ms: Option<f64>,
    pub sensor_right_sync_timestamp_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_left_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_right_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_lr_ms: Option<f64>,
}

impl AlignmentReport {
    fn new(cv: Option<f64>, mode: SyncMode, left: Option<f64>, right: Option<f64>) -> Self {
        let offset = |s: Option<f64>| Some(s? - cv?);
        let offset_left_ms = offset(left);
        let offset_right_ms = offset(right);
        let delta_lr_ms = match (offset_left_ms, offset_right_ms) {
            (Some(l), Some(r)) => Some((l - r).abs()),
            _ => None,
        };
        Self {
            cv_sync_timestamp_ms: cv,
            sensor_mode: mode,
            sensor_left_sync_timestamp_ms: left,
            sensor_right_sync_timestamp_ms: right,
            offset_left_ms,
            offset_right_ms,
            delta_lr_ms,
        }
    }

    /// Write as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

/// Spike-alignment parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchAligner {
    pub cv_k: f64,
    pub sensor_k: f64,
    pub window: usize,
    pub min_consecutive: usize,
}

impl Default for BatchAligner {
    fn default() -> Self {
        Self {
            cv_k: 5.0,
            sensor_k: 6.0,
            window: 50,
            min_consecutive: 2,
        }
    }
}

impl BatchAligner {
    pub fn validate(&self) -> Result<()> {
        if !self.cv_k.is_finite() || !self.sensor_k.is_finite() {
            return Err(GloveError::Config("k values must be finite".to_string()));
        }
        if self.window == 0 {
            return Err(GloveError::Config("window must be at least 1".to_string()));
        }
        if self.min_consecutive == 0 {
            return Err(GloveError::Config(
                "min_consecutive must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load every log, then detect and compare spikes.
    ///
    /// Any missing file or `timestamp_ms` column fails the whole run before
    /// a report exists.
    pub fn align(&self, cv: impl AsRef<Path>, sources: &AlignmentSources) -> Result<AlignmentReport> {
        self.validate()?;

        let cv_log = CsvLog::read(cv)?;
        let (left, right) = match sources {
            AlignmentSources::Single(path) => {
                let log = CsvLog::read(path)?;
                (Some(sensor_magnitude_single(&log)), None)
            }
            AlignmentSources::DualCombined(path) => {
                let log = CsvLog::read(path)?;
                (
                    Some(sensor_magnitude_dual(&log, Hand::Left)),
                    Some(sensor_magnitude_dual(&log, Hand::Right)),
                )
            }
            AlignmentSources::DualSplit { left, right } => {
                let left = CsvLog::read(left)?;
                let right = CsvLog::read(right)?;
                (
                    Some(sensor_magnitude_single(&left)),
                    Some(sensor_magnitude_single(&right)),
                )
            }
        };

        let cv_series = cv_velocity_series(&cv_log);
        tracing::debug!(
            "Aligning {} CV points against {} sensor log(s)",
            cv_series.len(),
            if right.is_some() { 2 } else { 1 }
        );

        let cv_spike = self.first_spike(&cv_series, self.cv_k);
        let left_spike = left.as_ref().and_then(|s| self.first_spike(s, self.sensor_k));
        let right_spike = right.as_ref().and_then(|s| self.first_spike(s, self.sensor_k));

        if cv_spike.is_none() {
            tracing::warn!("No spike found in CV log {}", cv_log.path().display());
        }

        Ok(AlignmentReport::new(
            cv_spike,
            sources.mode(),
            left_spike,
            right_spike,
        ))
    }

    fn first_spike(&self, series: &TimedSeries, k: f64) -> Option<f64> {
        detect_first_spike(
            &series.times,
            &series.values,
            k,
            self.window,
            self.min_consecutive,
        )
    }
}

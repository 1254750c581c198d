//! Offline alignment of recorded CV and sensor logs.
//!
//! Both streams are reduced to one series each (hand speed for CV,
//! acceleration magnitude per hand for the sensors); the first confirmed
//! spike in each gives the sync timestamps and their differences.

mod aligner;
mod log;
mod series;

pub use aligner::{AlignmentReport, AlignmentSources, BatchAligner, DEFAULT_REPORT_PATH};
pub use log::{cell, cell_or_zero, Column, CsvLog, TIMESTAMP_COLUMN};
pub use series::{
    cv_velocity_series, detect_first_spike, sensor_magnitude_dual, sensor_magnitude_single, Hand,
    TimedSeries,
};

//! Series derivation from recorded logs, and first-spike detection.

use super::log::{cell_or_zero, CsvLog};

/// Parallel time/value columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimedSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimedSeries {
    fn push(&mut self, time: f64, value: f64) {
        self.times.push(time);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Which hand of a combined dual-hand log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    fn prefix(self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

/// Hand speed from consecutive CV landmark positions.
///
/// The left hand is used when `L_exist` is set, else the right when
/// `R_exist` is set. A row with neither breaks the chain: the next
/// position has no predecessor. Pairs with a non-positive time step are
/// skipped; rows without a timestamp are ignored.
pub fn cv_velocity_series(log: &CsvLog) -> TimedSeries {
    let l_exist = log.column("L_exist");
    let r_exist = log.column("R_exist");
    let left = [log.column("L_x0"), log.column("L_y0"), log.column("L_z0")];
    let right = [log.column("R_x0"), log.column("R_y0"), log.column("R_z0")];

    let mut out = TimedSeries::default();
    let mut prev_pos: Option<[f64; 3]> = None;
    let mut prev_t: Option<f64> = None;

    for (t, row) in log.timestamps() {
        let Some(t) = t else {
            continue;
        };

        let flag = |c| cell_or_zero(row, c) as i64 != 0;
        let columns = if flag(l_exist) {
            left
        } else if flag(r_exist) {
            right
        } else {
            prev_pos = None;
            prev_t = Some(t);
            continue;
        };
        let pos = columns.map(|c| cell_or_zero(row, c));

        if let (Some(p), Some(pt)) = (prev_pos, prev_t) {
            let dt = t - pt;
            if dt > 0.0 {
                let dist = p
                    .iter()
                    .zip(pos.iter())
                    .map(|(a, b)| (b - a) * (b - a))
                    .sum::<f64>()
                    .sqrt();
                out.push(t, dist / dt);
            }
        }

        prev_pos = Some(pos);
        prev_t = Some(t);
    }
    out
}

/// Acceleration magnitude from `accel_x`, `accel_y`, `accel_z`.
pub fn sensor_magnitude_single(log: &CsvLog) -> TimedSeries {
    magnitude(log, ["accel_x", "accel_y", "accel_z"])
}

/// Acceleration magnitude of one hand of a combined log
/// (`left_acc_1..3` / `right_acc_1..3`).
pub fn sensor_magnitude_dual(log: &CsvLog, hand: Hand) -> TimedSeries {
    let p = hand.prefix();
    let names = [1, 2, 3].map(|i| format!("{p}_acc_{i}"));
    magnitude(log, [names[0].as_str(), names[1].as_str(), names[2].as_str()])
}

fn magnitude(log: &CsvLog, names: [&str; 3]) -> TimedSeries {
    let columns = names.map(|n| log.column(n));
    let mut out = TimedSeries::default();
    for (t, row) in log.timestamps() {
        let Some(t) = t else {
            continue;
        };
        let mag = columns
            .iter()
            .map(|&c| {
                let v = cell_or_zero(row, c);
                v * v
            })
            .sum::<f64>()
            .sqrt();
        out.push(t, mag);
    }
    out
}

/// Time of the first point completing a run of `min_consecutive` points
/// above `mean + k·σ` of the `window` values preceding each point.
///
/// Scans forward once. A point only counts when its window has σ > 0.
/// Returns `None` when the series is shorter than `window + min_consecutive`
/// or no run completes.
pub fn detect_first_spike(
    times: &[f64],
    values: &[f64],
    k: f64,
    window: usize,
    min_consecutive: usize,
) -> Option<f64> {
    let min_consecutive = min_consecutive.max(1);
    let n = values.len().min(times.len());
    if window == 0 || n < window + min_consecutive {
        return None;
    }

    let mut run = 0usize;
    for i in window..n {
        let preceding = &values[i - window..i];
        let len = window as f64;
        let mean = preceding.iter().sum::<f64>() / len;
        let std = (preceding.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / len).sqrt();

        if std > 0.0 && values[i] > mean + k * std {
            run += 1;
            if run >= min_consecutive {
                return Some(times[i + 1 - min_consecutive]);
            }
        } else {
            run = 0;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn log(dir: &tempfile::TempDir, text: &str) -> CsvLog {
        let path: PathBuf = dir.path().join("log.csv");
        std::fs::write(&path, text).unwrap();
        CsvLog::read(&path).unwrap()
    }

    #[test]
    fn test_detect_first_spike_returns_run_start() {
        let mut values: Vec<f64> = (0..20).map(|i| 1.0 + 0.1 * f64::from(i % 2)).collect();
        values.extend([10.0, 10.0, 10.0]);
        let times: Vec<f64> = (0..values.len()).map(|i| i as f64 * 5.0).collect();

        assert_eq!(detect_first_spike(&times, &values, 2.0, 10, 2), Some(100.0));
        assert_eq!(detect_first_spike(&times, &values, 2.0, 10, 1), Some(100.0));
    }

    #[test]
    fn test_detect_first_spike_needs_variance_and_length() {
        let flat = vec![1.0; 30];
        let times: Vec<f64> = (0..30).map(f64::from).collect();
        assert_eq!(detect_first_spike(&times, &flat, 1.0, 10, 2), None);

        // A jump after a perfectly flat window never counts (σ = 0).
        let mut step = vec![1.0; 20];
        step.extend([5.0, 5.0]);
        assert_eq!(detect_first_spike(&times[..22], &step, 1.0, 20, 2), None);

        assert_eq!(detect_first_spike(&times[..5], &flat[..5], 1.0, 4, 2), None);
        assert_eq!(detect_first_spike(&times, &flat, 1.0, 0, 2), None);
    }

    #[test]
    fn test_single_point_does_not_complete_run() {
        let mut values: Vec<f64> = (0..20).map(|i| 1.0 + 0.1 * f64::from(i % 2)).collect();
        values.push(10.0);
        values.extend((0..10).map(|i| 1.0 + 0.1 * f64::from(i % 2)));
        let times: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        assert_eq!(detect_first_spike(&times, &values, 3.0, 10, 2), None);
    }

    #[test]
    fn test_cv_velocity_left_then_right_then_gap() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(
            &dir,
            "timestamp_ms,L_exist,R_exist,L_x0,L_y0,L_z0,R_x0,R_y0,R_z0\n\
             0,1,0,0,0,0,9,9,9\n\
             10,1,0,3,4,0,9,9,9\n\
             10,1,0,6,8,0,9,9,9\n\
             20,0,1,0,0,0,0,0,10\n\
             30,0,0,0,0,0,0,0,0\n\
             40,1,0,1,0,0,0,0,0\n\
             50,1,0,2,0,0,0,0,0\n\
             ,1,0,100,0,0,0,0,0\n",
        );
        let s = cv_velocity_series(&log);
        // 10: |(3,4,0)| / 10; the repeated timestamp is skipped; 20: right
        // hand position differs by (-6,-8,10); 30 resets; 40 starts fresh.
        assert_eq!(s.times, vec![10.0, 20.0, 50.0]);
        assert_eq!(s.values[0], 0.5);
        assert!((s.values[1] - 200f64.sqrt() / 10.0).abs() < 1e-12);
        assert_eq!(s.values[2], 0.1);
    }

    #[test]
    fn test_sensor_magnitudes() {
        let dir = tempfile::tempdir().unwrap();
        let single = log(
            &dir,
            "timestamp_ms,accel_x,accel_y,accel_z\n0,3,4,0\n1,bad,0,2\nnope,1,1,1\n",
        );
        let s = sensor_magnitude_single(&single);
        assert_eq!(s.times, vec![0.0, 1.0]);
        assert_eq!(s.values, vec![5.0, 2.0]);

        let dual = log(
            &dir,
            "timestamp_ms,left_acc_1,left_acc_2,left_acc_3,right_acc_1,right_acc_2,right_acc_3\n\
             5,0,3,4,1,0,0\n",
        );
        assert_eq!(sensor_magnitude_dual(&dual, Hand::Left).values, vec![5.0]);
        assert_eq!(sensor_magnitude_dual(&dual, Hand::Right).values, vec![1.0]);
    }
}

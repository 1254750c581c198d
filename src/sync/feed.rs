//! Where the sensor side of a sync session comes from.
//!
//! - `Live`: the magnitude series the ingestion loop feeds.
//! - `Log`: the tail of a collector log, one peak magnitude per line.
//! - `Simulated`: a synthetic wave for working without hardware.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::protocol::SyncMode;

use super::series::{now_epoch_ms, Sample, SharedSeries, TimeSeries};

/// Default number of log lines considered per load.
pub const DEFAULT_LOG_LIMIT: usize = 200;

/// Spacing of simulated samples.
const SIMULATED_STEP_MS: f64 = 20.0;

/// Source of the sensor-magnitude series.
#[derive(Debug, Clone)]
pub enum SensorFeed {
    Live(SharedSeries),
    Log {
        single: Option<PathBuf>,
        dual: Option<PathBuf>,
        limit: usize,
    },
    Simulated,
}

impl SensorFeed {
    /// Current series for `mode`, trimmed to the newest `max_points`.
    ///
    /// Never fails: an unreadable or missing log is an empty series.
    pub async fn load(&self, mode: SyncMode, max_points: usize) -> TimeSeries {
        match self {
            SensorFeed::Live(shared) => {
                let snapshot = shared.snapshot();
                TimeSeries::from_samples(snapshot.iter().copied(), max_points)
            }
            SensorFeed::Log { single, dual, limit } => {
                let path = match mode {
                    SyncMode::Single => single.as_deref(),
                    SyncMode::Dual => dual.as_deref(),
                };
                match path {
                    Some(path) => read_log_series(path, *limit, max_points).await,
                    None => TimeSeries::new(max_points),
                }
            }
            SensorFeed::Simulated => simulate(max_points, now_epoch_ms()),
        }
    }
}

async fn read_log_series(path: &Path, limit: usize, max_points: usize) -> TimeSeries {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return TimeSeries::new(max_points);
        }
        Err(e) => {
            tracing::warn!("Failed to read sensor log {}: {}", path.display(), e);
            return TimeSeries::new(max_points);
        }
    };

    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let tail = &lines[lines.len().saturating_sub(limit)..];
    TimeSeries::from_samples(tail.iter().filter_map(|l| parse_log_line(l)), max_points)
}

/// Peak acceleration magnitude of one collector log line.
///
/// Every non-empty `[...]` group with at least 8 numbers contributes
/// `sqrt(ax²+ay²+az²)` from positions 5..8. A leading number before the
/// first `,` or `[` is the line's timestamp.
pub fn parse_log_line(line: &str) -> Option<Sample> {
    let mut peak: Option<f64> = None;
    for group in bracket_groups(line) {
        let nums: Vec<f64> = group
            .split(',')
            .filter_map(|cell| cell.trim().parse::<f64>().ok())
            .collect();
        if nums.len() >= 8 {
            let (ax, ay, az) = (nums[5], nums[6], nums[7]);
            let mag = (ax * ax + ay * ay + az * az).sqrt();
            peak = Some(peak.map_or(mag, |p| p.max(mag)));
        }
    }

    let value = peak?;
    Some(Sample {
        time_ms: leading_timestamp(line),
        value,
    })
}

/// Contents of non-empty `[...]` groups, left to right. An empty `[]` is
/// passed over.
fn bracket_groups(line: &str) -> impl Iterator<Item = &str> {
    let mut rest = line;
    std::iter::from_fn(move || loop {
        let open = rest.find('[')?;
        let after = &rest[open + 1..];
        let close = after.find(']')?;
        if close == 0 {
            rest = after;
            continue;
        }
        let group = &after[..close];
        rest = &after[close + 1..];
        return Some(group);
    })
}

fn leading_timestamp(line: &str) -> Option<f64> {
    let end = line.find(&[',', '['][..]).unwrap_or(line.len());
    let field = line[..end].trim();
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// Synthetic baseline wave with noise, plus a two-sample spike three points
/// from the end during one of every eight half-second slots.
fn simulate(max_points: usize, now_ms: f64) -> TimeSeries {
    let max_points = max_points.max(1);
    let now_s = now_ms / 1000.0;
    let phase = now_s * 1.7;
    let base = 0.35 + 0.05 * (phase / 2.0).sin();
    let mut rng = rand::thread_rng();

    let mut values: Vec<f64> = (0..max_points)
        .map(|i| {
            let wave = 0.12 * ((i as f64 + phase) / 6.0).sin();
            let noise = rng.gen_range(-0.03..0.03);
            (base + wave + noise).max(0.0)
        })
        .collect();

    if (now_s * 2.0) as i64 % 8 == 0 && max_points >= 3 {
        let at = max_points - 3;
        values[at] += 0.6;
        values[at + 1] += 0.4;
    }

    let start = now_ms - SIMULATED_STEP_MS * (max_points - 1) as f64;
    TimeSeries::from_samples(
        values.into_iter().enumerate().map(|(i, value)| Sample {
            time_ms: Some(start + SIMULATED_STEP_MS * i as f64),
            value,
        }),
        max_points,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_log_line_peak_and_timestamp() {
        let line = "1700000000123,[0,0,0,0,0,3,4,0,1,1,1],[0,0,0,0,0,0,0,12,0,0,0]";
        let sample = parse_log_line(line).unwrap();
        assert_eq!(sample.value, 12.0);
        assert_eq!(sample.time_ms, Some(1_700_000_000_123.0));
    }

    #[test]
    fn test_parse_log_line_without_timestamp() {
        let line = "INFO sample [0, 0, 0, 0, 0, 3, 4, 0]";
        let sample = parse_log_line(line).unwrap();
        assert_eq!(sample.value, 5.0);
        assert_eq!(sample.time_ms, None);
    }

    #[test]
    fn test_parse_log_line_skips_short_and_junk_groups() {
        assert_eq!(parse_log_line("no brackets here"), None);
        assert_eq!(parse_log_line("[1,2,3]"), None);
        assert_eq!(parse_log_line("[]"), None);

        // Non-numeric cells are skipped, the rest still count.
        let line = "[a,0,0,0,0,0,0,0,2]";
        assert_eq!(parse_log_line(line).unwrap().value, 2.0);
    }

    #[test]
    fn test_bracket_groups() {
        let groups: Vec<&str> = bracket_groups("x[1,2] [] [3]tail[").collect();
        assert_eq!(groups, vec!["1,2", "3"]);
    }

    #[tokio::test]
    async fn test_log_feed_reads_tail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(file, "{},[0,0,0,0,0,{},0,0]", 1000 + i, i).unwrap();
        }
        writeln!(file, "garbage line").unwrap();
        file.flush().unwrap();

        let feed = SensorFeed::Log {
            single: Some(file.path().to_path_buf()),
            dual: None,
            limit: 5,
        };
        let series = feed.load(SyncMode::Single, 60).await;
        // Last 5 lines: four readings plus the garbage line.
        assert_eq!(series.values(), vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(series.get(0).unwrap().time_ms, Some(1006.0));

        let trimmed = feed.load(SyncMode::Single, 2).await;
        assert_eq!(trimmed.values(), vec![8.0, 9.0]);

        // No dual log configured.
        assert!(feed.load(SyncMode::Dual, 60).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let feed = SensorFeed::Log {
            single: Some(dir.path().join("data_collection.log")),
            dual: None,
            limit: DEFAULT_LOG_LIMIT,
        };
        assert!(feed.load(SyncMode::Single, 60).await.is_empty());
    }

    #[tokio::test]
    async fn test_live_feed_snapshot() {
        let shared = SharedSeries::new(100);
        for i in 0..10 {
            shared.push_at(f64::from(i), f64::from(i) / 10.0);
        }
        let feed = SensorFeed::Live(shared);
        let series = feed.load(SyncMode::Dual, 4).await;
        assert_eq!(series.len(), 4);
        assert_eq!(series.get(3).unwrap().time_ms, Some(9.0));
    }

    #[test]
    fn test_simulated_shape() {
        // 3.25 s: int(6.5) = 6, no spike slot.
        let series = simulate(60, 3_250.0);
        assert_eq!(series.len(), 60);
        assert!(series.values().iter().all(|v| (0.0..1.0).contains(v)));
        assert_eq!(series.get(59).unwrap().time_ms, Some(3_250.0));
        assert_eq!(series.get(58).unwrap().time_ms, Some(3_230.0));

        // 4.0 s: int(8) % 8 == 0, spike injected.
        let quiet = simulate(60, 3_250.0).values();
        let spiky = simulate(60, 4_000.0).values();
        assert!(spiky[57] > 0.6);
        assert!(spiky[58] > 0.4);
        assert!(quiet[57] < 0.6);
    }

    #[test]
    fn test_simulated_noise_is_bounded() {
        // Same instant, same wave; only the noise differs.
        let a = simulate(60, 3_250.0).values();
        let b = simulate(60, 3_250.0).values();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() <= 0.06 + 1e-12);
        }
    }
}

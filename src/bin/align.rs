//! glovelink-align: offline spike alignment of recorded logs.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use glovelink::align::{AlignmentSources, BatchAligner, DEFAULT_REPORT_PATH};

/// Align a CV landmark log with one or two sensor logs using sync spikes.
#[derive(Debug, Parser)]
#[command(name = "glovelink-align", version)]
struct Cli {
    /// CV landmark CSV.
    #[arg(long)]
    cv: PathBuf,

    /// Single-hand sensor CSV.
    #[arg(long)]
    sensor: Option<PathBuf>,

    /// Left-hand sensor CSV, or a combined dual-hand CSV.
    #[arg(long)]
    sensor_left: Option<PathBuf>,

    /// Right-hand sensor CSV (split dual-hand logs).
    #[arg(long)]
    sensor_right: Option<PathBuf>,

    /// Report path.
    #[arg(long, default_value = DEFAULT_REPORT_PATH)]
    out: PathBuf,

    /// CV spike threshold multiplier.
    #[arg(long, default_value_t = 5.0)]
    cv_k: f64,

    /// Sensor spike threshold multiplier.
    #[arg(long, default_value_t = 6.0)]
    sensor_k: f64,

    /// Rolling window size for the statistics.
    #[arg(long, default_value_t = 50)]
    window: usize,

    /// Points in a row above threshold to confirm a spike.
    #[arg(long, default_value_t = 2)]
    min_consecutive: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let sources = AlignmentSources::resolve(cli.sensor, cli.sensor_left, cli.sensor_right)
        .context("Invalid sensor log selection")?;
    let aligner = BatchAligner {
        cv_k: cli.cv_k,
        sensor_k: cli.sensor_k,
        window: cli.window,
        min_consecutive: cli.min_consecutive,
    };

    let report = aligner
        .align(&cli.cv, &sources)
        .context("Alignment failed")?;
    report
        .write_json(&cli.out)
        .with_context(|| format!("Failed to write {}", cli.out.display()))?;

    tracing::info!("Wrote {}", cli.out.display());
    match (report.offset_left_ms, report.offset_right_ms) {
        (None, None) => tracing::warn!("No offset could be computed"),
        (left, right) => tracing::info!("Offsets: left {:?} ms, right {:?} ms", left, right),
    }
    Ok(())
}

//! glovelink collector entry point.
//!
//! Runs the live pipeline (ingestion, sender) and the sync server until
//! Ctrl-C, then shuts everything down in order.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use glovelink::config::Config;
use glovelink::sync::{SharedSeries, SyncCache, SyncServer};
use glovelink::transport::Listener;
use glovelink::{shutdown, EndpointConnector, Ingestion, LatestFrame, StreamSender};

/// Glove frame collector: segment gestures and deliver them downstream.
#[derive(Debug, Parser)]
#[command(name = "glovelink-collector", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame source: device path, tcp://host:port or unix:/path.
    #[arg(long)]
    source: Option<String>,

    /// Consumer endpoint for gesture batches.
    #[arg(long)]
    consumer: Option<String>,

    /// Session id sent with every batch.
    #[arg(long)]
    session_id: Option<String>,

    /// Do not start the sync server.
    #[arg(long)]
    no_sync: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(source) = cli.source {
        config.source.endpoint = source;
    }
    if let Some(consumer) = cli.consumer {
        config.delivery.endpoint = consumer;
    }
    if let Some(session_id) = cli.session_id {
        config.delivery.session_id = session_id;
    }
    if cli.no_sync {
        config.sync.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    let (trigger, stop) = shutdown::channel();
    let queue = config.queue();
    let latest = LatestFrame::new();
    let live = SharedSeries::new(config.sync.max_points);

    let connector = EndpointConnector::new(config.consumer_endpoint()?);
    let sender = StreamSender::new(connector, queue.clone(), config.sender_config());
    let sender = tokio::spawn(sender.run(stop.clone()));

    let sync = if config.sync.enabled {
        let listener = Listener::bind(&config.sync_endpoint()?)
            .await
            .context("Failed to bind sync server")?;
        let mut server = SyncServer::new(
            config.sync_server_config(),
            config.sensor_feed(&live),
            latest.clone(),
        );
        if config.sync.cache {
            server = server.with_cache(SyncCache::new());
        }
        Some(tokio::spawn(server.serve(listener, stop.clone())))
    } else {
        None
    };

    let mut ingestion = Ingestion::new(
        config.frame_source()?,
        config.normalizer,
        config.segmenter,
        queue,
        latest,
    )
    .with_mode(config.delivery.mode)
    .with_reconnect_delay(config.reconnect_delay());
    if config.sync.enabled && matches!(config.sync.feed, glovelink::config::FeedKind::Live) {
        ingestion = ingestion.with_live_series(live);
    }
    let ingestion = tokio::spawn(ingestion.run(stop));

    tracing::info!(
        "Collector running: source {}, consumer {}",
        config.source.endpoint,
        config.delivery.endpoint
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    trigger.trigger();

    let ingestion = ingestion.await.context("Ingestion task failed")?;
    let report = sender.await.context("Sender task failed")?;
    if let Some(sync) = sync {
        sync.await.context("Sync server task failed")?;
    }

    tracing::info!(
        "Ingestion: {} frames, {} windows, {} queued, {} rejected",
        ingestion.frames,
        ingestion.windows,
        ingestion.enqueued,
        ingestion.rejected
    );
    tracing::info!(
        "Delivery: {} batches ({} entries) sent, {} retries, {} discarded",
        report.batches_sent,
        report.items_sent,
        report.retries,
        report.discarded
    );
    Ok(())
}

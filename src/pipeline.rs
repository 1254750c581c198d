//! Ingestion loop: frame source → normalizer → segmenter → delivery queue.
//!
//! The loop owns the source and the segmenter. While the source is down it
//! retries `connect()` every `reconnect_delay`, forever; each successful
//! connect starts segmentation from scratch. Every frame read is conformed
//! to the channel layout, stored in the [`LatestFrame`] slot, normalized,
//! optionally fed to the live sync series, and segmented. Finished windows
//! go to the queue whole or frame by frame, per [`DeliveryMode`].
//!
//! On shutdown the source is closed and the queue stops accepting entries;
//! what happens to entries already queued is the sender's shutdown policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::{Frame, CHANNELS};
use crate::latest::LatestFrame;
use crate::normalize::FrameNormalizer;
use crate::protocol::DeliveryItem;
use crate::queue::DeliveryQueue;
use crate::segmenter::{MovementSegmenter, SegmenterConfig};
use crate::shutdown::Shutdown;
use crate::source::FrameSource;
use crate::sync::{now_epoch_ms, SharedSeries};

/// Default pause between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Unit of delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// One queue entry per gesture window.
    #[default]
    Windows,
    /// One queue entry per frame of each window.
    Frames,
}

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionStats {
    pub connects: u64,
    pub frames: u64,
    /// Frames whose width had to be padded or truncated.
    pub frames_conformed: u64,
    pub windows: u64,
    pub enqueued: u64,
    /// Entries the queue refused (backpressure or closed).
    pub rejected: u64,
}

/// The ingestion task. Consumed by [`run`](Ingestion::run).
pub struct Ingestion<S> {
    source: S,
    normalizer: FrameNormalizer,
    segmenter: MovementSegmenter,
    queue: DeliveryQueue<DeliveryItem>,
    latest: LatestFrame,
    live: Option<SharedSeries>,
    mode: DeliveryMode,
    reconnect_delay: Duration,
    stats: IngestionStats,
}

impl<S: FrameSource> Ingestion<S> {
    pub fn new(
        source: S,
        normalizer: FrameNormalizer,
        segmenter: SegmenterConfig,
        queue: DeliveryQueue<DeliveryItem>,
        latest: LatestFrame,
    ) -> Self {
        Self {
            source,
            normalizer,
            segmenter: MovementSegmenter::new(segmenter),
            queue,
            latest,
            live: None,
            mode: DeliveryMode::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            stats: IngestionStats::default(),
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Feed each frame's acceleration magnitude into `series`.
    pub fn with_live_series(mut self, series: SharedSeries) -> Self {
        self.live = Some(series);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Read until shutdown is requested.
    pub async fn run(mut self, mut shutdown: Shutdown) -> IngestionStats {
        while !shutdown.is_requested() {
            if !self.source.is_connected() {
                let connected = tokio::select! {
                    c = self.source.connect() => c,
                    _ = shutdown.requested() => break,
                };
                if connected {
                    self.stats.connects += 1;
                    self.segmenter.reset();
                } else if !shutdown.sleep(self.reconnect_delay).await {
                    break;
                }
                continue;
            }

            let values = tokio::select! {
                v = self.source.read() => v,
                _ = shutdown.requested() => break,
            };
            if let Some(values) = values {
                self.process(&values).await;
            }
        }

        self.source.close().await;
        self.queue.close();
        tracing::info!(
            "Ingestion stopped: {} frames, {} windows, {} entries queued, {} rejected",
            self.stats.frames,
            self.stats.windows,
            self.stats.enqueued,
            self.stats.rejected
        );
        self.stats
    }

    async fn process(&mut self, values: &[f32]) {
        self.stats.frames += 1;
        let (frame, conformed) = Frame::conform(values);
        if conformed {
            self.stats.frames_conformed += 1;
            tracing::debug!("Conformed {}-value frame to {} channels", values.len(), CHANNELS);
        }

        self.latest.set(frame);
        let normalized = self.normalizer.normalize(&frame);
        if let Some(live) = &self.live {
            live.push_at(now_epoch_ms(), normalized.accel_magnitude());
        }

        let Some(window) = self.segmenter.update(normalized) else {
            return;
        };
        self.stats.windows += 1;
        tracing::info!("Gesture window detected ({} frames)", window.len());

        match self.mode {
            DeliveryMode::Windows => self.enqueue(DeliveryItem::Window(window)).await,
            DeliveryMode::Frames => {
                for frame in window {
                    self.enqueue(DeliveryItem::Frame(frame)).await;
                }
            }
        }
    }

    async fn enqueue(&mut self, item: DeliveryItem) {
        let frames = item.frame_count();
        match self.queue.push(item).await {
            Ok(()) => self.stats.enqueued += 1,
            Err(e) => {
                self.stats.rejected += 1;
                tracing::warn!("Dropping {}-frame entry: {}", frames, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OverflowPolicy;
    use crate::shutdown;
    use crate::source::LineFrameSource;

    fn line(first: f32) -> String {
        let mut cells = vec!["0".to_string(); CHANNELS];
        cells[0] = first.to_string();
        format!("{}\n", cells.join(","))
    }

    /// Ten frames of motion between quiet stretches: one 10-frame window.
    fn one_gesture() -> String {
        let mut input = String::new();
        for _ in 0..5 {
            input.push_str(&line(0.0));
        }
        input.push_str(&line(1.0));
        for _ in 0..4 {
            input.push_str(&line(0.0));
        }
        input.push_str(&line(1.0));
        for _ in 0..10 {
            input.push_str(&line(0.0));
        }
        input
    }

    fn ingestion(input: String, queue: DeliveryQueue<DeliveryItem>) -> Ingestion<LineFrameSource> {
        let source = LineFrameSource::from_reader(std::io::Cursor::new(input.into_bytes()));
        Ingestion::new(
            source,
            FrameNormalizer::identity(),
            SegmenterConfig::default(),
            queue,
            LatestFrame::new(),
        )
        .with_reconnect_delay(Duration::from_millis(5))
    }

    async fn run_until_read(ing: Ingestion<LineFrameSource>) -> IngestionStats {
        let (trigger, listener) = shutdown::channel();
        let task = tokio::spawn(ing.run(listener));
        // The reader is exhausted almost at once; the loop then idles in
        // reconnect attempts until told to stop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        task.await.unwrap()
    }

    #[tokio::test]
    async fn test_window_mode_enqueues_one_window() {
        let queue = DeliveryQueue::new(10, OverflowPolicy::DropOldest);
        let stats = run_until_read(ingestion(one_gesture(), queue.clone())).await;

        assert_eq!(stats.connects, 1);
        assert_eq!(stats.frames, 21);
        assert_eq!(stats.windows, 1);
        assert_eq!(stats.enqueued, 1);
        assert!(queue.is_closed());

        let batch = queue.try_next_batch(10).unwrap();
        match &batch.items()[0] {
            DeliveryItem::Window(w) => assert_eq!(w.len(), 10),
            other => panic!("expected a window, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frame_mode_enqueues_each_frame() {
        let queue = DeliveryQueue::new(50, OverflowPolicy::DropOldest);
        let ing = ingestion(one_gesture(), queue.clone()).with_mode(DeliveryMode::Frames);
        let stats = run_until_read(ing).await;

        assert_eq!(stats.windows, 1);
        assert_eq!(stats.enqueued, 10);
        let batch = queue.try_next_batch(50).unwrap();
        assert_eq!(batch.len(), 10);
        assert!(batch.items().iter().all(|i| matches!(i, DeliveryItem::Frame(_))));
    }

    #[tokio::test]
    async fn test_quiet_stream_enqueues_nothing() {
        let queue = DeliveryQueue::new(10, OverflowPolicy::DropOldest);
        let input: String = (0..40).map(|_| line(0.5)).collect();
        let stats = run_until_read(ingestion(input, queue.clone())).await;
        assert_eq!(stats.frames, 40);
        assert_eq!(stats.windows, 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_latest_slot_and_live_series() {
        let queue = DeliveryQueue::new(10, OverflowPolicy::DropOldest);
        let latest = LatestFrame::new();
        let live = SharedSeries::new(100);

        // Short rows are padded; accel channel 5 carries 2 g.
        let input = "1,2,3\n0,0,0,0,0,2,0,0,0,0,0\n".to_string();
        let source = LineFrameSource::from_reader(std::io::Cursor::new(input.into_bytes()))
            .with_width(3);
        let ing = Ingestion::new(
            source,
            FrameNormalizer::identity(),
            SegmenterConfig::default(),
            queue,
            latest.clone(),
        )
        .with_live_series(live.clone())
        .with_reconnect_delay(Duration::from_millis(5));

        let stats = run_until_read(ing).await;
        // Only the 3-value line matches the source width.
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.frames_conformed, 1);

        let frame = latest.get().unwrap();
        assert_eq!(&frame.values()[..4], &[1.0, 2.0, 3.0, 0.0]);
        assert_eq!(live.snapshot().values(), vec![0.0]);
    }

    #[tokio::test]
    async fn test_rejected_entries_counted() {
        let queue = DeliveryQueue::new(1, OverflowPolicy::Block);
        queue.close();
        let stats = run_until_read(ingestion(one_gesture(), queue)).await;
        assert_eq!(stats.windows, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.enqueued, 0);
    }
}

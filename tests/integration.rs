//! Integration tests for glovelink.
//!
//! These wire the public pieces together the way the collector binary
//! does, with in-memory or loopback links in place of real devices.

use std::time::Duration;

use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;

use glovelink::codec::Codec;
use glovelink::protocol::{kind, Batch, DeliveryItem, DeliveryReply, SyncMode, SyncRequest, SyncResponse};
use glovelink::queue::{DeliveryQueue, OverflowPolicy};
use glovelink::sender::{Connector, SenderConfig, ShutdownPolicy, StreamSender};
use glovelink::sync::{SensorFeed, SharedSeries, SyncServer, SyncServerConfig};
use glovelink::transport::{Endpoint, Listener, PacketConnection, Stream};
use glovelink::{
    shutdown, FrameNormalizer, GloveError, Ingestion, LatestFrame, LineFrameSource, SegmenterConfig,
    CHANNELS,
};

struct DuplexConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
}

impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> glovelink::Result<DuplexStream> {
        let (near, far) = duplex(64 * 1024);
        self.peers.send(far).map_err(|_| GloveError::ConnectionClosed)?;
        Ok(near)
    }
}

fn line(first: f32) -> String {
    let mut cells = vec!["0".to_string(); CHANNELS];
    cells[0] = first.to_string();
    format!("{}\n", cells.join(","))
}

/// 21 frames holding one ten-frame movement.
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

fn source() -> LineFrameSource {
    LineFrameSource::from_reader(std::io::Cursor::new(one_gesture().into_bytes()))
}

#[tokio::test]
async fn test_gesture_reaches_consumer() {
    let queue = DeliveryQueue::new(16, OverflowPolicy::DropOldest);
    let (trigger, stop) = shutdown::channel();

    let (tx, mut peers) = mpsc::unbounded_channel();
    let config = SenderConfig {
        session_id: "glove-1".to_string(),
        batch_interval: Duration::from_millis(5),
        reply_timeout: Duration::from_millis(500),
        shutdown: ShutdownPolicy::Drain {
            timeout: Duration::from_millis(200),
        },
        ..SenderConfig::default()
    };
    let sender = StreamSender::new(DuplexConnector { peers: tx }, queue.clone(), config);
    let sender = tokio::spawn(sender.run(stop.clone()));

    let ingestion = Ingestion::new(
        source(),
        FrameNormalizer::identity(),
        SegmenterConfig::default(),
        queue,
        LatestFrame::new(),
    )
    .with_reconnect_delay(Duration::from_millis(5));
    let ingestion = tokio::spawn(ingestion.run(stop));

    let mut consumer = PacketConnection::new(peers.recv().await.unwrap());
    let packet = tokio::time::timeout(Duration::from_secs(2), consumer.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.kind(), kind::BATCH);
    let batch: Batch<DeliveryItem> = packet.decode().unwrap();
    consumer
        .send_message(
            kind::REPLY,
            packet.sequence(),
            Codec::Json,
            &DeliveryReply::prediction("wave", 0.8),
        )
        .await
        .unwrap();

    assert_eq!(batch.session_id, "glove-1");
    assert_eq!(batch.sensor_values.len(), 1);
    match &batch.sensor_values[0] {
        DeliveryItem::Window(window) => assert_eq!(window.len(), 10),
        other => panic!("expected a window, got {other:?}"),
    }

    trigger.trigger();
    let stats = ingestion.await.unwrap();
    let report = sender.await.unwrap();
    assert_eq!(stats.frames, 21);
    assert_eq!(stats.windows, 1);
    assert_eq!(report.batches_sent, 1);
    assert_eq!(report.items_sent, 1);
    assert_eq!(report.discarded, 0);
}

#[tokio::test]
async fn test_live_series_served_over_tcp() {
    let queue = DeliveryQueue::new(16, OverflowPolicy::DropOldest);
    let latest = LatestFrame::new();
    let live = SharedSeries::new(500);
    let (trigger, stop) = shutdown::channel();

    let ingestion = Ingestion::new(
        source(),
        FrameNormalizer::identity(),
        SegmenterConfig::default(),
        queue,
        latest.clone(),
    )
    .with_live_series(live.clone())
    .with_reconnect_delay(Duration::from_millis(5));
    let ingestion = tokio::spawn(ingestion.run(stop.clone()));

    while live.snapshot().len() < 21 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listener = Listener::bind(&Endpoint::parse("tcp://127.0.0.1:0").unwrap())
        .await
        .unwrap();
    let bound = listener.local_endpoint().unwrap();
    let config = SyncServerConfig {
        push_interval: Duration::from_secs(60),
        ..SyncServerConfig::default()
    };
    let server = SyncServer::new(config, SensorFeed::Live(live), latest);
    let server = tokio::spawn(server.serve(listener, stop));

    let mut client = PacketConnection::new(Stream::connect(&bound).await.unwrap());

    client
        .send_message(kind::SYNC_REQUEST, 1, Codec::Json, &SyncRequest::Latest)
        .await
        .unwrap();
    let mut latest_seen = None;
    let mut series_seen = None;
    client
        .send_message(kind::SYNC_REQUEST, 2, Codec::Json, &SyncRequest::Tick)
        .await
        .unwrap();
    while latest_seen.is_none() || series_seen.is_none() {
        let (seq, response) = client
            .recv_message::<SyncResponse>(kind::SYNC_RESPONSE)
            .await
            .unwrap();
        match response {
            SyncResponse::LatestFrame { values, real_sensor } if seq == 1 => {
                latest_seen = Some((values, real_sensor))
            }
            SyncResponse::SyncSeries(series) if seq == 2 => series_seen = Some(series),
            _ => {}
        }
    }

    let (values, real_sensor) = latest_seen.unwrap();
    assert!(real_sensor);
    assert_eq!(values, vec![0.0; CHANNELS]);

    let series = series_seen.unwrap();
    assert_eq!(series.mode, SyncMode::Single);
    assert_eq!(series.sensor.series.len(), 21);
    assert!(series.cv.series.is_empty());
    assert_eq!(series.offset_ms, None);

    trigger.trigger();
    ingestion.await.unwrap();
    server.await.unwrap();
}

//! Sync stream server.
//!
//! Each connection is one session with its own mode, CV ring and codec.
//! The session answers requests as they arrive and pushes `sync_series`:
//!
//! - immediately on `tick`;
//! - after any other request (except `configure`) once `push_interval`
//!   has passed since the previous push;
//! - on its own every `push_interval` while the client is quiet.
//!
//! Replies echo the request sequence; idle pushes carry sequence 0. Every
//! response uses the codec of the last request received.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::codec::Codec;
use crate::error::{GloveError, Result};
use crate::latest::LatestFrame;
use crate::protocol::{kind, Packet, SyncMode, SyncRequest, SyncResponse};
use crate::shutdown::Shutdown;
use crate::transport::{Listener, PacketConnection};

use super::buffer::{SyncBuffer, DEFAULT_CV_K, DEFAULT_MAX_POINTS, DEFAULT_SENSOR_K};
use super::cache::SyncCache;
use super::feed::SensorFeed;
use super::series::now_epoch_ms;
use super::spike::DEFAULT_WINDOW_SIZE;

/// Default spacing between pushes.
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SyncServerConfig {
    pub max_points: usize,
    pub window_size: usize,
    pub sensor_k: f64,
    pub cv_k: f64,
    pub push_interval: Duration,
}

impl Default for SyncServerConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            window_size: DEFAULT_WINDOW_SIZE,
            sensor_k: DEFAULT_SENSOR_K,
            cv_k: DEFAULT_CV_K,
            push_interval: DEFAULT_PUSH_INTERVAL,
        }
    }
}

/// Serves sync sessions. Clones share the feed, the latest-frame slot and
/// the replay cache.
#[derive(Debug, Clone)]
pub struct SyncServer {
    config: SyncServerConfig,
    feed: Arc<SensorFeed>,
    latest: LatestFrame,
    cache: Option<SyncCache>,
}

struct Session {
    mode: SyncMode,
    buffer: SyncBuffer,
    codec: Codec,
    last_push: Option<Instant>,
}

impl SyncServer {
    pub fn new(config: SyncServerConfig, feed: SensorFeed, latest: LatestFrame) -> Self {
        Self {
            config,
            feed: Arc::new(feed),
            latest,
            cache: None,
        }
    }

    /// Keep the last pushed payload for `replay`.
    pub fn with_cache(mut self, cache: SyncCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&SyncCache> {
        self.cache.as_ref()
    }

    /// Accept connections until shutdown, one task per session.
    pub async fn serve(self, listener: Listener, mut shutdown: Shutdown) {
        if let Ok(endpoint) = listener.local_endpoint() {
            tracing::info!("Sync server listening on {}", endpoint);
        }
        let mut sessions = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                r = listener.accept() => r,
                _ = shutdown.requested() => break,
            };
            match accepted {
                Ok((stream, peer)) => {
                    tracing::info!("Sync client connected: {}", peer);
                    let server = self.clone();
                    let session_shutdown = shutdown.clone();
                    sessions.spawn(async move {
                        if let Err(e) = server.run_session(stream, session_shutdown).await {
                            tracing::warn!("Sync session {} ended: {}", peer, e);
                        } else {
                            tracing::info!("Sync client disconnected: {}", peer);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Sync accept failed: {}", e);
                    if !shutdown.sleep(Duration::from_millis(100)).await {
                        break;
                    }
                }
            }
            // Reap finished sessions.
            while sessions.try_join_next().is_some() {}
        }

        while sessions.join_next().await.is_some() {}
        tracing::info!("Sync server stopped");
    }

    /// Run one session to completion. A clean disconnect is `Ok`.
    pub async fn run_session<S>(&self, stream: S, mut shutdown: Shutdown) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = PacketConnection::new(stream);
        let mut session = Session {
            mode: SyncMode::default(),
            buffer: SyncBuffer::with_params(
                self.config.max_points,
                self.config.window_size,
                self.config.sensor_k,
                self.config.cv_k,
            ),
            codec: Codec::Json,
            last_push: None,
        };

        let period = self.config.push_interval.max(Duration::from_millis(1));
        let mut idle = tokio::time::interval_at(Instant::now() + period, period);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.requested() => break,
                packet = conn.recv() => match packet {
                    Ok(packet) => self.handle(&mut conn, &mut session, packet).await?,
                    Err(GloveError::ConnectionClosed) => break,
                    Err(e) => return Err(e),
                },
                _ = idle.tick() => {
                    if self.push_due(&session) {
                        self.push(&mut conn, &mut session, 0).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle<S>(
        &self,
        conn: &mut PacketConnection<S>,
        session: &mut Session,
        packet: Packet,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        session.codec = packet.codec();
        let sequence = packet.sequence();

        if packet.kind() != kind::SYNC_REQUEST {
            let message = format!("unexpected packet kind {}", packet.kind());
            return self.respond(conn, session, sequence, &SyncResponse::Error { message }).await;
        }

        let request = match packet.decode::<SyncRequest>() {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Malformed sync request: {}", e);
                let message = format!("invalid request: {e}");
                return self.respond(conn, session, sequence, &SyncResponse::Error { message }).await;
            }
        };

        match request {
            SyncRequest::Configure { mode } => {
                if let Some(mode) = mode {
                    session.mode = SyncMode::parse_lenient(&mode);
                }
                let ack = SyncResponse::Ack { mode: session.mode };
                return self.respond(conn, session, sequence, &ack).await;
            }
            SyncRequest::Tick => return self.push(conn, session, sequence).await,
            SyncRequest::CvSample {
                velocity,
                timestamp_ms,
            } => {
                if let Some(velocity) = velocity {
                    let at = timestamp_ms
                        .filter(|t| t.is_finite())
                        .unwrap_or_else(now_epoch_ms);
                    session.buffer.add_cv_sample_at(at, velocity);
                }
            }
            SyncRequest::Latest => {
                let response = match self.latest.get() {
                    Some(frame) => SyncResponse::LatestFrame {
                        values: frame.values().to_vec(),
                        real_sensor: true,
                    },
                    None => SyncResponse::LatestFrame {
                        values: Vec::new(),
                        real_sensor: false,
                    },
                };
                self.respond(conn, session, sequence, &response).await?;
            }
            SyncRequest::Replay => {
                let response = match self.cache.as_ref().and_then(SyncCache::get) {
                    Some(payload) => SyncResponse::SyncSeries(payload),
                    None => SyncResponse::Error {
                        message: "no sync payload cached".to_string(),
                    },
                };
                self.respond(conn, session, sequence, &response).await?;
            }
        }

        if self.push_due(session) {
            self.push(conn, session, sequence).await?;
        }
        Ok(())
    }

    fn push_due(&self, session: &Session) -> bool {
        session
            .last_push
            .map_or(true, |at| at.elapsed() >= self.config.push_interval)
    }

    async fn push<S>(
        &self,
        conn: &mut PacketConnection<S>,
        session: &mut Session,
        sequence: u32,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let sensor = self.feed.load(session.mode, self.config.max_points).await;
        let payload = session.buffer.snapshot(session.mode, &sensor);
        if let Some(cache) = &self.cache {
            cache.store(payload.clone());
        }
        session.last_push = Some(Instant::now());
        self.respond(conn, session, sequence, &SyncResponse::SyncSeries(payload))
            .await
    }

    async fn respond<S>(
        &self,
        conn: &mut PacketConnection<S>,
        session: &Session,
        sequence: u32,
        response: &SyncResponse,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        conn.send_message(kind::SYNC_RESPONSE, sequence, session.codec, response)
            .await
    }
}

//! Batch sender: drains the delivery queue to the consumer.
//!
//! One long-running task owns the connection. Each cycle takes up to
//! `batch_size` entries from the queue, sends them as one batch packet and
//! waits for the consumer's reply:
//!
//! ```text
//!   connect ──fail──► pause reconnect_backoff ──► connect
//!      │
//!      ▼
//!   next_batch ──► send ──► reply ──► complete
//!                    │
//!                    └─fail/timeout─► requeue at front, pause retry_delay,
//!                                     drop connection, reconnect
//! ```
//!
//! Retries are unbounded: a consumer that never recovers keeps the same
//! batch at the head of the queue forever, while the queue bound and its
//! overflow policy protect the producer.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::codec::Codec;
use crate::error::{GloveError, Result};
use crate::protocol::{kind, BatchRef, DeliveryItem, DeliveryReply, ReplyOutcome};
use crate::queue::DeliveryQueue;
use crate::shutdown::Shutdown;
use crate::transport::{Endpoint, PacketConnection, Stream};

/// Opens connections to the consumer.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Connects to a fixed [`Endpoint`].
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: Endpoint,
}

impl EndpointConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl Connector for EndpointConnector {
    type Stream = Stream;

    async fn connect(&self) -> Result<Stream> {
        Stream::connect(&self.endpoint).await
    }
}

/// What happens to undelivered entries on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Keep delivering until the queue is empty or `timeout` elapses, then
    /// discard the remainder.
    Drain { timeout: Duration },
    /// Drop pending entries immediately.
    Discard,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::Drain {
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Sender settings.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub session_id: String,
    pub codec: Codec,
    pub batch_size: usize,
    /// How long an idle cycle waits for the first entry.
    pub batch_interval: Duration,
    pub retry_delay: Duration,
    pub reconnect_backoff: Duration,
    pub reply_timeout: Duration,
    pub shutdown: ShutdownPolicy,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            session_id: "demo".to_string(),
            codec: Codec::Json,
            batch_size: 5,
            batch_interval: Duration::from_millis(50),
            retry_delay: Duration::from_millis(1000),
            reconnect_backoff: Duration::from_millis(2000),
            reply_timeout: Duration::from_millis(5000),
            shutdown: ShutdownPolicy::default(),
        }
    }
}

/// Totals returned when the sender stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderReport {
    pub batches_sent: u64,
    pub items_sent: u64,
    pub retries: u64,
    pub discarded: u64,
}

/// The sender task. Consumed by [`run`](StreamSender::run).
pub struct StreamSender<C, T = DeliveryItem> {
    connector: C,
    queue: DeliveryQueue<T>,
    config: SenderConfig,
    sequence: u32,
    report: SenderReport,
}

impl<C, T> StreamSender<C, T>
where
    C: Connector,
    T: Serialize + Send + Sync + 'static,
{
    pub fn new(connector: C, queue: DeliveryQueue<T>, config: SenderConfig) -> Self {
        Self {
            connector,
            queue,
            config,
            sequence: 0,
            report: SenderReport::default(),
        }
    }

    /// Deliver until shutdown is requested, then apply the shutdown policy.
    pub async fn run(mut self, mut shutdown: Shutdown) -> SenderReport {
        let mut conn: Option<PacketConnection<C::Stream>> = None;

        while !shutdown.is_requested() {
            if conn.is_none() {
                conn = self.connect_or_backoff(&mut shutdown).await;
                continue;
            }
            let Some(c) = conn.as_mut() else {
                continue;
            };

            let batch = tokio::select! {
                batch = self.queue.next_batch(self.config.batch_size, self.config.batch_interval) => batch,
                _ = shutdown.requested() => break,
            };
            let Some(batch) = batch else {
                continue;
            };

            match self.deliver(c, batch.items()).await {
                Ok(()) => batch.complete(),
                Err(e) => {
                    tracing::warn!(
                        "Batch of {} failed ({}), requeued; retrying in {:?}",
                        batch.len(),
                        e,
                        self.config.retry_delay
                    );
                    batch.requeue();
                    self.report.retries += 1;
                    conn = None;
                    shutdown.sleep(self.config.retry_delay).await;
                }
            }
        }

        self.finish(conn).await;
        self.report
    }

    async fn connect_or_backoff(
        &self,
        shutdown: &mut Shutdown,
    ) -> Option<PacketConnection<C::Stream>> {
        let attempt = tokio::select! {
            r = self.connector.connect() => r,
            _ = shutdown.requested() => return None,
        };
        match attempt {
            Ok(stream) => {
                tracing::info!("Connected to consumer");
                Some(PacketConnection::new(stream))
            }
            Err(e) => {
                tracing::warn!(
                    "Consumer connection failed: {}, reconnecting in {:?}",
                    e,
                    self.config.reconnect_backoff
                );
                shutdown.sleep(self.config.reconnect_backoff).await;
                None
            }
        }
    }

    /// One send cycle: batch out, reply in.
    async fn deliver(&mut self, conn: &mut PacketConnection<C::Stream>, items: &[T]) -> Result<()> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;

        let payload = BatchRef {
            sensor_values: items,
            session_id: &self.config.session_id,
        };
        conn.send_message(kind::BATCH, sequence, self.config.codec, &payload)
            .await?;

        let (reply_sequence, reply) = tokio::time::timeout(
            self.config.reply_timeout,
            conn.recv_message::<DeliveryReply>(kind::REPLY),
        )
        .await
        .map_err(|_| GloveError::Timeout)??;

        if reply_sequence != sequence {
            tracing::warn!(
                "Reply sequence {} does not match batch {}",
                reply_sequence,
                sequence
            );
        }

        self.report.batches_sent += 1;
        self.report.items_sent += items.len() as u64;

        match reply.outcome() {
            ReplyOutcome::Prediction { label, confidence } => tracing::info!(
                "Batch {} sent ({} items), prediction: {} confidence: {:?}",
                sequence,
                items.len(),
                label,
                confidence
            ),
            ReplyOutcome::NoResult { status, message } => tracing::debug!(
                "Batch {} sent ({} items), no result (status {:?}, message {:?})",
                sequence,
                items.len(),
                status,
                message
            ),
        }
        Ok(())
    }

    async fn finish(&mut self, conn: Option<PacketConnection<C::Stream>>) {
        self.queue.close();

        match self.config.shutdown {
            ShutdownPolicy::Discard => {}
            ShutdownPolicy::Drain { timeout } => {
                let pending = self.queue.len();
                if pending > 0 {
                    tracing::info!("Draining {} queued entries (up to {:?})", pending, timeout);
                    self.drain(conn, Instant::now() + timeout).await;
                }
            }
        }

        let discarded = self.queue.discard();
        if discarded > 0 {
            tracing::warn!("Discarded {} undelivered entries on shutdown", discarded);
        }
        self.report.discarded += discarded as u64;
    }

    /// Deliver until the queue is empty or `deadline` passes. A batch still
    /// in flight at the deadline goes back to the queue, so the final
    /// discard counts it.
    async fn drain(&mut self, mut conn: Option<PacketConnection<C::Stream>>, deadline: Instant) {
        loop {
            if Instant::now() >= deadline {
                tracing::warn!("Drain timed out");
                return;
            }
            let Some(batch) = self.queue.try_next_batch(self.config.batch_size) else {
                return;
            };

            if conn.is_none() {
                let attempt = tokio::select! {
                    r = self.connector.connect() => Some(r),
                    _ = tokio::time::sleep_until(deadline) => None,
                };
                match attempt {
                    Some(Ok(stream)) => conn = Some(PacketConnection::new(stream)),
                    Some(Err(e)) => {
                        tracing::warn!("Consumer connection failed during drain: {}", e);
                        batch.requeue();
                        self.pause_before(deadline).await;
                        continue;
                    }
                    None => {
                        batch.requeue();
                        tracing::warn!("Drain timed out while connecting");
                        return;
                    }
                }
            }
            let Some(c) = conn.as_mut() else {
                batch.requeue();
                continue;
            };

            let outcome = tokio::select! {
                r = self.deliver(c, batch.items()) => Some(r),
                _ = tokio::time::sleep_until(deadline) => None,
            };
            match outcome {
                Some(Ok(())) => batch.complete(),
                Some(Err(e)) => {
                    tracing::warn!("Batch failed during drain ({}), requeued", e);
                    batch.requeue();
                    self.report.retries += 1;
                    conn = None;
                    self.pause_before(deadline).await;
                }
                None => {
                    tracing::warn!("Drain timed out awaiting a reply for {} entries", batch.len());
                    batch.requeue();
                    return;
                }
            }
        }
    }

    async fn pause_before(&self, deadline: Instant) {
        let until = deadline.min(Instant::now() + self.config.retry_delay);
        tokio::time::sleep_until(until).await;
    }
}

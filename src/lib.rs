//! # glovelink
//!
//! Streaming pipeline for a motion-sensing glove, plus time alignment of
//! the glove stream against an independently captured vision stream.
//!
//! ## Architecture
//!
//! - **Ingestion**: device lines → frames → normalization → variance-based
//!   movement segmentation → bounded delivery queue
//! - **Delivery**: a reconnecting sender drains the queue in batches over a
//!   framed TCP / Unix socket link, requeueing failed batches at the front
//! - **Sync**: rolling-window spike detection on the sensor magnitude and
//!   CV velocity series, served live to sync clients
//! - **Align**: the same spike idea applied offline to recorded CSV logs
//!
//! ## Example
//!
//! ```ignore
//! use glovelink::{config::Config, pipeline::Ingestion, sender::*, shutdown, LatestFrame};
//!
//! #[tokio::main]
//! async fn main() -> glovelink::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let queue = config.queue();
//!     let (trigger, stop) = shutdown::channel();
//!
//!     let connector = EndpointConnector::new(config.consumer_endpoint()?);
//!     let sender = StreamSender::new(connector, queue.clone(), config.sender_config());
//!     let sender = tokio::spawn(sender.run(stop.clone()));
//!
//!     let ingestion = Ingestion::new(
//!         config.frame_source()?,
//!         config.normalizer,
//!         config.segmenter,
//!         queue,
//!         LatestFrame::new(),
//!     );
//!     let ingestion = tokio::spawn(ingestion.run(stop));
//!
//!     tokio::signal::ctrl_c().await?;
//!     trigger.trigger();
//!     let _ = (ingestion.await, sender.await);
//!     Ok(())
//! }
//! ```

pub mod align;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod latest;
pub mod normalize;
pub mod pipeline;
pub mod protocol;
pub mod queue;
pub mod segmenter;
pub mod sender;
pub mod shutdown;
pub mod source;
pub mod sync;
pub mod transport;

pub use error::{GloveError, Result};
pub use frame::{Frame, GestureWindow, NormalizedFrame, CHANNELS};
pub use latest::LatestFrame;
pub use normalize::FrameNormalizer;
pub use pipeline::{DeliveryMode, Ingestion, IngestionStats};
pub use queue::{DeliveryQueue, InFlight, OverflowPolicy};
pub use segmenter::{MovementSegmenter, SegmenterConfig};
pub use sender::{Connector, EndpointConnector, SenderConfig, ShutdownPolicy, StreamSender};
pub use source::{FrameSource, LineFrameSource};

//! Frame sources: where raw sensor lines come from.
//!
//! The glove prints one frame per line as comma-separated numbers. A
//! [`FrameSource`] hides where those lines come from (a serial device node,
//! a TCP bridge, a recorded file, an in-memory pipe) and never surfaces an
//! error from `read`: faults are logged and the source disables itself until
//! the caller reconnects.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::frame::{parse_line, CHANNELS};
use crate::transport::{Endpoint, Stream};

/// Default wait for one complete line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default pause after opening a device.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(2000);

/// A line-per-frame input.
pub trait FrameSource: Send {
    /// Establish the link. On failure the error is logged and the source
    /// stays disabled; returns whether the source is now connected.
    fn connect(&mut self) -> impl Future<Output = bool> + Send;

    /// Next well-formed frame, or `None` if none is available right now.
    fn read(&mut self) -> impl Future<Output = Option<Vec<f32>>> + Send;

    /// Release the link. Safe to call repeatedly.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    fn is_connected(&self) -> bool;
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

enum Origin {
    Device(PathBuf),
    Endpoint(Endpoint),
    /// One-shot reader; cannot be reopened once consumed.
    Reader(Option<BoxedReader>),
}

impl Origin {
    fn describe(&self) -> String {
        match self {
            Origin::Device(path) => path.display().to_string(),
            Origin::Endpoint(endpoint) => endpoint.to_string(),
            Origin::Reader(_) => "reader".to_string(),
        }
    }
}

/// [`FrameSource`] over any line-oriented byte stream.
pub struct LineFrameSource {
    origin: Origin,
    width: usize,
    read_timeout: Duration,
    settle: Duration,
    reader: Option<BufReader<BoxedReader>>,
    pending: Vec<u8>,
}

impl LineFrameSource {
    /// Source for a device path or a `tcp://` / `unix:` endpoint.
    pub fn open(target: &str) -> crate::error::Result<Self> {
        let origin = if Endpoint::looks_like_endpoint(target) {
            Origin::Endpoint(Endpoint::parse(target)?)
        } else {
            Origin::Device(PathBuf::from(target))
        };
        Ok(Self::with_origin(origin))
    }

    /// Source reading an already-open stream. It connects once; after end of
    /// stream it stays disabled.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut source = Self::with_origin(Origin::Reader(Some(Box::new(reader))));
        source.settle = Duration::ZERO;
        source
    }

    fn with_origin(origin: Origin) -> Self {
        Self {
            origin,
            width: CHANNELS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle: DEFAULT_SETTLE,
            reader: None,
            pending: Vec::with_capacity(128),
        }
    }

    /// Number of values a line must carry.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Pause after opening a device node (the board resets on open).
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    async fn open_reader(&mut self) -> crate::error::Result<Option<BoxedReader>> {
        match &mut self.origin {
            Origin::Device(path) => {
                let file = tokio::fs::File::open(&*path).await?;
                if !self.settle.is_zero() {
                    tokio::time::sleep(self.settle).await;
                }
                Ok(Some(Box::new(file)))
            }
            Origin::Endpoint(endpoint) => Ok(Some(Box::new(Stream::connect(endpoint).await?))),
            Origin::Reader(reader) => Ok(reader.take()),
        }
    }

    fn disable(&mut self) {
        self.reader = None;
        self.pending.clear();
    }

    fn decode_line(&self, bytes: &[u8]) -> Option<Vec<f32>> {
        let Ok(text) = std::str::from_utf8(bytes) else {
            tracing::debug!("Dropping non-UTF-8 line ({} bytes)", bytes.len());
            return None;
        };
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let values = parse_line(text, self.width);
        if values.is_none() {
            tracing::debug!("Dropping malformed line: {:?}", text);
        }
        values
    }
}

impl FrameSource for LineFrameSource {
    async fn connect(&mut self) -> bool {
        if self.reader.is_some() {
            return true;
        }
        match self.open_reader().await {
            Ok(Some(reader)) => {
                tracing::info!("Frame source connected: {}", self.origin.describe());
                self.pending.clear();
                self.reader = Some(BufReader::new(reader));
                true
            }
            Ok(None) => {
                tracing::debug!("Frame source {} is exhausted", self.origin.describe());
                false
            }
            Err(e) => {
                tracing::error!(
                    "Failed to connect frame source {}: {}",
                    self.origin.describe(),
                    e
                );
                false
            }
        }
    }

    async fn read(&mut self) -> Option<Vec<f32>> {
        let reader = self.reader.as_mut()?;

        // read_until keeps partial bytes in `pending` when the timeout
        // cancels it, so the next call resumes the same line.
        let result =
            tokio::time::timeout(self.read_timeout, reader.read_until(b'\n', &mut self.pending))
                .await;

        match result {
            Err(_) => None,
            Ok(Ok(0)) => {
                tracing::warn!("Frame source {} reached end of stream", self.origin.describe());
                self.disable();
                None
            }
            Ok(Ok(_)) => {
                let values = self.decode_line(&self.pending);
                self.pending.clear();
                values
            }
            Ok(Err(e)) => {
                tracing::warn!("Frame source {} read error: {}", self.origin.describe(), e);
                self.disable();
                None
            }
        }
    }

    async fn close(&mut self) {
        if self.reader.is_some() {
            tracing::info!("Frame source closed: {}", self.origin.describe());
        }
        self.disable();
    }

    fn is_connected(&self) -> bool {
        self.reader.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{duplex, AsyncWriteExt};

    fn line(values: &[f32]) -> String {
        let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        format!("{}\n", cells.join(","))
    }

    #[tokio::test]
    async fn test_reads_frames_and_drops_bad_lines() {
        let mut input = line(&[1.0; CHANNELS]);
        input.push_str("1,2,3\n");
        input.push_str("a,b,c,d,e,f,g,h,i,j,k\n");
        input.push_str("\n");
        input.push_str(&line(&[2.0; CHANNELS]));

        let mut source = LineFrameSource::from_reader(std::io::Cursor::new(input.into_bytes()));
        assert!(!source.is_connected());
        assert!(source.read().await.is_none());
        assert!(source.connect().await);

        assert_eq!(source.read().await, Some(vec![1.0; CHANNELS]));
        assert_eq!(source.read().await, None);
        assert_eq!(source.read().await, None);
        assert_eq!(source.read().await, None);
        assert_eq!(source.read().await, Some(vec![2.0; CHANNELS]));

        // End of stream disables the source; the one-shot reader is gone.
        assert_eq!(source.read().await, None);
        assert!(!source.is_connected());
        assert!(!source.connect().await);
    }

    #[tokio::test]
    async fn test_non_utf8_line_dropped() {
        let mut input = vec![0xFF, 0xFE, b'\n'];
        input.extend(line(&[3.0; CHANNELS]).into_bytes());
        let mut source = LineFrameSource::from_reader(std::io::Cursor::new(input));
        source.connect().await;
        assert_eq!(source.read().await, None);
        assert_eq!(source.read().await, Some(vec![3.0; CHANNELS]));
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let input = "1,2,3".to_string();
        let mut source =
            LineFrameSource::from_reader(std::io::Cursor::new(input.into_bytes())).with_width(3);
        source.connect().await;
        assert_eq!(source.read().await, Some(vec![1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_line() {
        let (mut device, host) = duplex(256);
        let mut source = LineFrameSource::from_reader(host)
            .with_width(3)
            .with_read_timeout(Duration::from_millis(20));
        source.connect().await;

        // Nothing written: the read times out and the source stays up.
        assert_eq!(source.read().await, None);
        assert!(source.is_connected());

        device.write_all(b"4,5").await.unwrap();
        assert_eq!(source.read().await, None);

        device.write_all(b",6\n").await.unwrap();
        assert_eq!(source.read().await, Some(vec![4.0, 5.0, 6.0]));
    }

    #[tokio::test]
    async fn test_device_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", line(&[5.0; CHANNELS])).unwrap();
        file.flush().unwrap();

        let mut source = LineFrameSource::open(file.path().to_str().unwrap())
            .unwrap()
            .with_settle(Duration::ZERO);
        assert!(source.connect().await);
        assert_eq!(source.read().await, Some(vec![5.0; CHANNELS]));
        assert_eq!(source.read().await, None);
        assert!(!source.is_connected());

        // A file can be reopened.
        assert!(source.connect().await);
        assert_eq!(source.read().await, Some(vec![5.0; CHANNELS]));
    }

    #[tokio::test]
    async fn test_missing_device_stays_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ttyUSB9");
        let mut source = LineFrameSource::open(path.to_str().unwrap()).unwrap();
        assert!(!source.connect().await);
        assert!(!source.is_connected());
        assert_eq!(source.read().await, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut source = LineFrameSource::from_reader(std::io::Cursor::new(Vec::new()));
        source.connect().await;
        source.close().await;
        source.close().await;
        assert!(!source.is_connected());
    }

    #[test]
    fn test_open_parses_endpoints() {
        assert!(LineFrameSource::open("tcp://127.0.0.1:9000").is_ok());
        assert!(LineFrameSource::open("tcp://nope").is_err());
        assert!(LineFrameSource::open("/dev/ttyACM0").is_ok());
    }
}

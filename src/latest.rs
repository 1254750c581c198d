//! Single-slot cell holding the most recent raw frame.
//!
//! Written by the ingestion loop on every frame and read from other tasks
//! or threads (the sync server's `latest` request, status reporting). This
//! is the one structure shared across concurrency domains, so access goes
//! through a mutex rather than relying on cooperative scheduling.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::Frame;

/// Shared handle to the latest frame. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl LatestFrame {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame.
    #[inline]
    pub fn set(&self, frame: Frame) {
        *self.slot.lock() = Some(frame);
    }

    /// Copy of the stored frame, if any frame has been seen.
    #[inline]
    pub fn get(&self) -> Option<Frame> {
        *self.slot.lock()
    }

    /// Forget the stored frame (e.g. after the device disconnects).
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

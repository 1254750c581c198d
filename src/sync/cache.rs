//! Last pushed `sync_series` payload, shared by every session.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::SyncSeries;

/// Replay slot for the most recent push. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct SyncCache {
    last: Arc<Mutex<Option<SyncSeries>>>,
}

impl SyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, payload: SyncSeries) {
        *self.last.lock() = Some(payload);
    }

    pub fn get(&self) -> Option<SyncSeries> {
        self.last.lock().clone()
    }

    pub fn clear(&self) {
        *self.last.lock() = None;
    }
}

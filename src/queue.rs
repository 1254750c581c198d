//! Bounded delivery queue between the ingestion loop and the sender.
//!
//! The queue is a double-ended FIFO with a hard capacity. Entries taken for
//! sending stay charged against the capacity until the send is settled, so
//! a failed batch can always be pushed back at the front without breaking
//! the bound or the order:
//!
//! ```text
//!  producer ──push──► [ pending ..................... ] ──next_batch──► InFlight
//!                      ▲                                                  │
//!                      └──────────────── requeue (front) ◄────────────────┤
//!                                                                         │
//!                                     complete (slots released) ◄─────────┘
//! ```
//!
//! # Overflow
//!
//! - [`OverflowPolicy::DropOldest`]: evict the oldest pending entry to make
//!   room. If every slot is in flight the new entry is rejected.
//! - [`OverflowPolicy::Block`]: wait for a slot, up to a timeout.
//!
//! Either way the queue never holds more than `capacity` entries.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;

use crate::error::{GloveError, Result};

/// Default queue capacity (entries).
pub const DEFAULT_CAPACITY: usize = 100;

/// Default time a blocked producer waits for a slot.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// What to do when a producer finds the queue full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending entry.
    #[default]
    DropOldest,
    /// Wait for a free slot.
    Block,
}

#[derive(Debug)]
struct State<T> {
    pending: VecDeque<T>,
    in_flight: usize,
    dropped: u64,
    closed: bool,
}

impl<T> State<T> {
    #[inline]
    fn occupancy(&self) -> usize {
        self.pending.len() + self.in_flight
    }
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    block_timeout: Duration,
    /// Signalled when entries become available to the consumer.
    items: Notify,
    /// Signalled when slots are released.
    space: Notify,
}

/// Bounded FIFO shared by one producer and one consumer. Clones share state.
#[derive(Debug)]
pub struct DeliveryQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for DeliveryQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> DeliveryQueue<T> {
    /// Create a queue with the default block timeout.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self::with_timeout(capacity, policy, DEFAULT_BLOCK_TIMEOUT)
    }

    /// Create a queue with a custom block timeout.
    pub fn with_timeout(capacity: usize, policy: OverflowPolicy, block_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    pending: VecDeque::with_capacity(capacity),
                    in_flight: 0,
                    dropped: 0,
                    closed: false,
                }),
                capacity,
                policy,
                block_timeout,
                items: Notify::new(),
                space: Notify::new(),
            }),
        }
    }

    /// Maximum number of entries (pending + in flight).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Entries waiting to be sent.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Entries currently taken by the sender.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight
    }

    /// Pending plus in-flight entries.
    pub fn len(&self) -> usize {
        self.shared.state.lock().occupancy()
    }

    /// Check if nothing is pending or in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries evicted by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.shared.state.lock().dropped
    }

    /// Check if the queue has been closed to producers.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Try to add an entry without waiting.
    ///
    /// Under `DropOldest` a full queue evicts its oldest pending entry.
    /// Under `Block` a full queue returns `Err(Backpressure)`.
    pub fn try_push(&self, item: T) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(GloveError::QueueClosed);
        }

        if state.occupancy() >= self.shared.capacity {
            match self.shared.policy {
                OverflowPolicy::Block => return Err(GloveError::Backpressure),
                OverflowPolicy::DropOldest => {
                    if state.pending.pop_front().is_none() {
                        // Every slot is held by the batch in flight.
                        return Err(GloveError::Backpressure);
                    }
                    state.dropped += 1;
                    tracing::warn!(
                        "Delivery queue full ({}), dropped oldest entry",
                        self.shared.capacity
                    );
                }
            }
        }

        state.pending.push_back(item);
        drop(state);
        self.shared.items.notify_waiters();
        Ok(())
    }

    /// Add an entry, applying the overflow policy.
    ///
    /// Under `Block` this waits up to the block timeout for a slot and then
    /// returns `Err(Backpressure)`.
    pub async fn push(&self, item: T) -> Result<()> {
        match self.shared.policy {
            OverflowPolicy::DropOldest => self.try_push(item),
            OverflowPolicy::Block => {
                let deadline = tokio::time::Instant::now() + self.shared.block_timeout;
                loop {
                    let notified = self.shared.space.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    {
                        let mut state = self.shared.state.lock();
                        if state.closed {
                            return Err(GloveError::QueueClosed);
                        }
                        if state.occupancy() < self.shared.capacity {
                            state.pending.push_back(item);
                            drop(state);
                            self.shared.items.notify_waiters();
                            return Ok(());
                        }
                    }

                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(GloveError::Backpressure);
                    }
                }
            }
        }
    }

    /// Take up to `max` entries from the front as one batch.
    ///
    /// If nothing is pending, waits up to `wait` for an entry to arrive and
    /// returns `None` if the queue is still empty.
    pub async fn next_batch(&self, max: usize, wait: Duration) -> Option<InFlight<T>> {
        let notified = self.shared.items.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(batch) = self.try_next_batch(max) {
            return Some(batch);
        }

        let _ = tokio::time::timeout(wait, notified).await;
        self.try_next_batch(max)
    }

    /// Take up to `max` entries without waiting.
    pub fn try_next_batch(&self, max: usize) -> Option<InFlight<T>> {
        let mut state = self.shared.state.lock();
        if state.pending.is_empty() || max == 0 {
            return None;
        }

        let n = max.min(state.pending.len());
        let items: Vec<T> = state.pending.drain(..n).collect();
        state.in_flight += n;

        Some(InFlight {
            queue: self.clone(),
            items: Some(items),
        })
    }

    /// Stop accepting new entries. Pending entries can still be taken.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.space.notify_waiters();
        self.shared.items.notify_waiters();
    }

    /// Drop every pending entry and return how many were dropped.
    ///
    /// In-flight entries are untouched.
    pub fn discard(&self) -> usize {
        let mut state = self.shared.state.lock();
        let n = state.pending.len();
        state.pending.clear();
        drop(state);
        if n > 0 {
            self.shared.space.notify_waiters();
        }
        n
    }

    fn release(&self, count: usize) {
        let mut state = self.shared.state.lock();
        state.in_flight = state.in_flight.saturating_sub(count);
        drop(state);
        self.shared.space.notify_waiters();
    }

    fn requeue_front(&self, items: Vec<T>) {
        let mut state = self.shared.state.lock();
        state.in_flight = state.in_flight.saturating_sub(items.len());
        for item in items.into_iter().rev() {
            state.pending.push_front(item);
        }
        drop(state);
        self.shared.items.notify_waiters();
    }
}

/// A batch taken from the queue and not yet settled.
///
/// Settle it with [`complete`](InFlight::complete) after a successful send
/// or [`requeue`](InFlight::requeue) after a failure. Dropping an unsettled
/// batch releases its slots and the entries are lost.
#[derive(Debug)]
pub struct InFlight<T> {
    queue: DeliveryQueue<T>,
    items: Option<Vec<T>>,
}

impl<T> InFlight<T> {
    /// Entries in the batch, in queue order.
    pub fn items(&self) -> &[T] {
        self.items.as_deref().unwrap_or(&[])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Mark the batch as delivered and free its slots.
    pub fn complete(mut self) {
        if let Some(items) = self.items.take() {
            self.queue.release(items.len());
        }
    }

    /// Put the batch back at the front of the queue, order preserved.
    pub fn requeue(mut self) {
        if let Some(items) = self.items.take() {
            self.queue.requeue_front(items);
        }
    }
}

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        if let Some(items) = self.items.take() {
            tracing::warn!("Unsettled batch of {} entries dropped", items.len());
            self.queue.release(items.len());
        }
    }
}

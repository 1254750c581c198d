//! Cooperative shutdown signal shared by the long-running tasks.
//!
//! Built on a `tokio::sync::watch` channel holding a single flag. Every task
//! holds a [`Shutdown`] clone and checks it at its suspension points; the
//! owner keeps the [`ShutdownTrigger`]. Dropping the trigger counts as a
//! shutdown request, so tasks never outlive their owner by accident.

use tokio::sync::watch;

/// Create a linked trigger/listener pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Owner side: requests shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Ask every listener to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Create another listener.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Listener side: cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Check whether shutdown has been requested (or the trigger is gone).
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until shutdown is requested. Returns immediately if it already was.
    pub async fn requested(&mut self) {
        // An Err means the trigger was dropped, which is also a stop request.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration`, returning early on shutdown.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&mut self, duration: std::time::Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.requested() => false,
        }
    }
}

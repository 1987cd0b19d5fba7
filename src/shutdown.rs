//! Cooperative shutdown flag.
//!
//! Set once by the worker. Agents poll it between reads and before every
//! reconnect attempt, and await it next to blocking reads so a read loop
//! stops within one poll of the flag being raised.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared, set-once shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create a lowered flag.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the flag. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the flag has been raised.
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is raised.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so this only returns once raised
        let _ = rx.wait_for(|down| *down).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

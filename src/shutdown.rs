//! # Cooperative shutdown signal
//!
//! Replaces the original's `stop_threads` flag guarded by a mutex/condvar
//! pair with a [`tokio::sync::watch`] channel: every worker holds a
//! receiver and `select!`s on it alongside its normal blocking operation,
//! so a flip wakes a worker even mid-`recv`/`send`, not just between
//! iterations (Design Notes §9, "cooperative shutdown").

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, _rx) = watch::channel(false);
        let rx = tx.subscribe();
        (Self { tx }, rx)
    }

    /// Flip the flag. Both `Orchestrator::request_stop` (called by a
    /// worker after an unrecoverable I/O error) and `Orchestrator::stop`
    /// (called by the embedding application) route here; the distinction
    /// between them is the caller's authority, not the mechanism.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

//! Cancelable one-shot session timer
//!
//! Drives preset auto-stop: fire the callback exactly once after the
//! configured duration unless canceled first. Cancel racing against
//! expiry resolves through the channel: the worker either receives the
//! cancel message in time or it times out and fires, never both.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// A single-shot timer backing one preset session
pub struct SessionClock {
    cancel_tx: Sender<()>,
}

impl SessionClock {
    /// Start a timer that runs `on_fire` once after `duration`, unless
    /// [`cancel`](Self::cancel) is called first.
    pub fn schedule<F>(duration: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        thread::spawn(move || match cancel_rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => on_fire(),
            // canceled explicitly, or the clock handle was dropped
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        });
        Self { cancel_tx }
    }

    /// Cancel the timer. Before expiry this guarantees the callback never
    /// runs; after firing (or after an earlier cancel) it is a no-op.
    pub fn cancel(&mut self) {
        // send fails only if the worker already fired and exited
        let _ = self.cancel_tx.send(());
    }
}

//! Progress channel to the observer.
//!
//! A one-way, ordered, best-effort stream of [`ProgressEvent`]s. Events sent
//! from one task arrive in the order they were sent; events from the
//! output-relay tasks interleave freely with the stage narration.
//!
//! Delivery never fails the pipeline: once the observer is gone, sends are
//! dropped and the disconnection is logged locally once.

use rr_protocol::ipc::ProgressEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};

/// Default capacity of the channel between the pipeline and its observer.
pub const DEFAULT_CAPACITY: usize = 256;

/// Sending half of the progress stream. Cheap to clone.
#[derive(Clone)]
pub struct ProgressChannel {
    tx: Sender<ProgressEvent>,
    disconnected: Arc<AtomicBool>,
}

impl ProgressChannel {
    /// Create a channel and the receiver the observer reads from.
    pub fn new(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::from_sender(tx), rx)
    }

    /// Wrap an existing sender.
    pub fn from_sender(tx: Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send an event. Failures are logged once and otherwise ignored.
    pub async fn emit(&self, event: ProgressEvent) {
        if self.disconnected.load(Ordering::Relaxed) {
            return;
        }
        tracing::trace!(line = %event.render(), "progress");
        if self.tx.send(event).await.is_err()
            && !self.disconnected.swap(true, Ordering::Relaxed)
        {
            tracing::debug!("Observer disconnected; dropping further progress events");
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::info(message)).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::warning(message)).await;
    }

    pub async fn success(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::success(message)).await;
    }

    /// Whether the observer has gone away.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed) || self.tx.is_closed()
    }
}

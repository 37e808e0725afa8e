//! Process-wide status of the most recent run.
//!
//! Backed by a `tokio::sync::watch` channel: the orchestrator writes, status
//! queries read a copy. A new run resets the record; concurrent runs simply
//! overwrite each other (last run wins).

use rr_protocol::ipc::StatusSnapshot;
use rr_protocol::process_models::Tier;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared `backend_running` / `frontend_running` record. Cheap to clone.
#[derive(Clone)]
pub struct SharedStatus {
    tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStatus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> StatusSnapshot {
        *self.tx.borrow()
    }

    /// Set both flags back to false.
    pub fn reset(&self) {
        self.tx.send_replace(StatusSnapshot::default());
    }

    /// Mark a tier as running.
    pub fn set_running(&self, tier: Tier) {
        self.tx.send_modify(|status| match tier {
            Tier::Backend => status.backend_running = true,
            Tier::Frontend => status.frontend_running = true,
        });
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }
}

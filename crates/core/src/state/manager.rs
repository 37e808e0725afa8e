//! Run manager.
//!
//! The RunManager owns the engine, the shared status record and the result of
//! the most recent run. Runs execute on their own tokio task so the caller
//! (typically a websocket handler) only has to forward progress events.

use crate::engine::PipelineEngine;
use crate::progress::ProgressChannel;
use crate::state::run::PipelineRun;
use crate::state::status::SharedStatus;
use rr_protocol::ipc::StatusSnapshot;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Starts provisioning runs and remembers the last one.
///
/// Concurrent runs are not coordinated: each resets the shared status and the
/// last one to finish is the one remembered.
#[derive(Clone)]
pub struct RunManager {
    engine: Arc<PipelineEngine>,
    status: SharedStatus,
    last_run: Arc<Mutex<Option<PipelineRun>>>,
}

impl RunManager {
    pub fn new(engine: PipelineEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            status: SharedStatus::new(),
            last_run: Arc::new(Mutex::new(None)),
        }
    }

    /// Current coarse status, for out-of-band queries.
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    pub fn shared_status(&self) -> &SharedStatus {
        &self.status
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    /// Run the pipeline in the background.
    ///
    /// The returned handle resolves once the run has finished and its final
    /// state has been stored. Dropping the handle does not stop the run.
    pub fn start_run(&self, progress: ProgressChannel) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let status = self.status.clone();
        let last_run = Arc::clone(&self.last_run);

        tokio::spawn(async move {
            let run = engine.run(&status, &progress).await;
            *last_run.lock().await = Some(run);
        })
    }

    /// Final state of the most recently finished run.
    pub async fn last_run(&self) -> Option<PipelineRun> {
        self.last_run.lock().await.clone()
    }
}

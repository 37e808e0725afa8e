//! Pipeline run context.
//!
//! A [`PipelineRun`] is created when a run is triggered and passed through
//! every stage. It records each stage's result and the paths and processes
//! the stages produce. The transition functions below also emit the matching
//! progress events, so narration and recorded state never disagree.

use crate::progress::ProgressChannel;
use chrono::{DateTime, Utc};
use rr_protocol::ipc::ProgressEvent;
use rr_protocol::pipeline_models::{AcquisitionAttempt, RunOutcome, Stage, StageRecord, StageResult};
use rr_protocol::process_models::{ManagedProcess, RuntimeEnvironment};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// State of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,

    /// Results in stage order.
    pub records: Vec<StageRecord>,

    pub work_dir: PathBuf,

    /// Clean clone destination chosen by the prepare stage.
    pub destination: Option<PathBuf>,

    pub acquisition: Vec<AcquisitionAttempt>,

    /// Root of the acquired source tree.
    pub source_tree: Option<PathBuf>,

    /// Directory holding both tiers.
    pub base_dir: Option<PathBuf>,

    pub backend_dir: Option<PathBuf>,
    pub frontend_dir: Option<PathBuf>,

    pub backend_env: Option<RuntimeEnvironment>,
    pub frontend_env: Option<RuntimeEnvironment>,

    /// Tier processes started during this run.
    pub processes: Vec<ManagedProcess>,

    /// Terminal state, once reached.
    pub outcome: Option<RunOutcome>,
}

impl PipelineRun {
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            records: Vec::new(),
            work_dir,
            destination: None,
            acquisition: Vec::new(),
            source_tree: None,
            base_dir: None,
            backend_dir: None,
            frontend_dir: None,
            backend_env: None,
            frontend_env: None,
            processes: Vec::new(),
            outcome: None,
        }
    }

    /// Result recorded for `stage`, if it ran.
    pub fn result_of(&self, stage: Stage) -> Option<&StageResult> {
        self.records
            .iter()
            .find(|record| record.stage == stage)
            .map(|record| &record.result)
    }

    /// Stages that produced a result, in order.
    pub fn stages_run(&self) -> Vec<Stage> {
        self.records.iter().map(|record| record.stage).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Narrate the start of a stage.
pub async fn begin_stage(stage: Stage, progress: &ProgressChannel) {
    tracing::info!(step = stage.number(), "{}", stage.title());
    progress.emit(ProgressEvent::StageStarted { stage }).await;
}

/// Record a stage result and narrate it.
///
/// Warnings are emitted as separate lines before the completion line. A
/// fatal result moves the run to [`RunOutcome::Aborted`].
pub async fn record_stage(
    run: &mut PipelineRun,
    stage: Stage,
    result: StageResult,
    summary: &str,
    progress: &ProgressChannel,
) {
    match &result {
        StageResult::Fatal(reason) => {
            tracing::error!(step = stage.number(), "{}", reason);
            progress.emit(ProgressEvent::fatal(reason.clone())).await;
            run.outcome = Some(RunOutcome::Aborted {
                stage,
                reason: reason.clone(),
            });
        }
        other => {
            for warning in other.warnings() {
                tracing::warn!(step = stage.number(), "{}", warning);
                progress.warn(warning.clone()).await;
            }
            progress
                .emit(ProgressEvent::StageCompleted {
                    stage,
                    summary: summary.to_string(),
                })
                .await;
        }
    }

    run.records.push(StageRecord { stage, result });
}

/// Stop the run before `stage` because the observer went away.
pub fn cancel_run(run: &mut PipelineRun, before: Stage) {
    tracing::info!(
        "Observer disconnected; stopping before step {}",
        before.number()
    );
    run.outcome = Some(RunOutcome::Cancelled { before });
}

/// Finish the run successfully and announce completion.
pub async fn complete_run(run: &mut PipelineRun, progress: &ProgressChannel) {
    run.outcome = Some(RunOutcome::Succeeded);
    progress.emit(ProgressEvent::Finished).await;
}

//! Provisioning pipeline models.
//!
//! This module defines the fixed stage table of the provisioning pipeline,
//! the tagged outcome each stage produces, and the terminal outcome of a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;

/// A stage of the provisioning pipeline.
///
/// Stages execute strictly in the order of [`Stage::ALL`]. The numbering
/// matches the step numbers shown to the observer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Prepare the working directory and clean prior run artifacts.
    PrepareWorkspace,

    /// Acquire the source tree from the remote origin.
    AcquireSource,

    /// Locate the directory containing both tiers.
    LocateBase,

    /// Locate the backend subdirectory.
    LocateBackend,

    /// Build the backend's isolated environment.
    BuildBackendEnv,

    /// Install backend dependencies.
    InstallBackendDeps,

    /// Start the backend server and poll its readiness.
    StartBackend,

    /// Locate the frontend subdirectory.
    LocateFrontend,

    /// Build, install and start the frontend, then poll its readiness.
    StartFrontend,

    /// Emit the final summary with access URLs.
    Summary,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 10] = [
        Stage::PrepareWorkspace,
        Stage::AcquireSource,
        Stage::LocateBase,
        Stage::LocateBackend,
        Stage::BuildBackendEnv,
        Stage::InstallBackendDeps,
        Stage::StartBackend,
        Stage::LocateFrontend,
        Stage::StartFrontend,
        Stage::Summary,
    ];

    /// One-based step number.
    pub fn number(&self) -> usize {
        match self {
            Stage::PrepareWorkspace => 1,
            Stage::AcquireSource => 2,
            Stage::LocateBase => 3,
            Stage::LocateBackend => 4,
            Stage::BuildBackendEnv => 5,
            Stage::InstallBackendDeps => 6,
            Stage::StartBackend => 7,
            Stage::LocateFrontend => 8,
            Stage::StartFrontend => 9,
            Stage::Summary => 10,
        }
    }

    /// Short description narrated when the stage starts.
    pub fn title(&self) -> &'static str {
        match self {
            Stage::PrepareWorkspace => "Preparing for clean installation",
            Stage::AcquireSource => "Acquiring repository source",
            Stage::LocateBase => "Checking for base directory",
            Stage::LocateBackend => "Locating backend directory",
            Stage::BuildBackendEnv => "Creating Python virtual environment",
            Stage::InstallBackendDeps => "Installing Python dependencies",
            Stage::StartBackend => "Starting backend server",
            Stage::LocateFrontend => "Locating frontend directory",
            Stage::StartFrontend => "Installing and starting frontend",
            Stage::Summary => "Summarizing",
        }
    }

    /// Whether a failure in this stage aborts the run.
    ///
    /// Only structurally absent inputs are fatal: the source tree and the two
    /// tier directories. Everything else degrades and continues.
    pub fn is_fatal_on_failure(&self) -> bool {
        matches!(
            self,
            Stage::AcquireSource | Stage::LocateBackend | Stage::LocateFrontend
        )
    }
}

/// Tagged outcome of a single stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum StageResult {
    Completed,

    /// The stage finished but degraded along the way.
    CompletedWithWarnings(Vec<String>),

    /// The stage failed and the run must stop.
    Fatal(String),
}

impl StageResult {
    /// Build a result from collected warnings.
    pub fn from_warnings(warnings: Vec<String>) -> Self {
        if warnings.is_empty() {
            StageResult::Completed
        } else {
            StageResult::CompletedWithWarnings(warnings)
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageResult::Fatal(_))
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            StageResult::CompletedWithWarnings(warnings) => warnings,
            _ => &[],
        }
    }
}

/// A recorded stage outcome.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StageRecord {
    pub stage: Stage,
    pub result: StageResult,
}

/// Terminal state of a pipeline run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RunOutcome {
    /// Every stage ran.
    Succeeded,

    /// A fatal stage result stopped the run.
    Aborted { stage: Stage, reason: String },

    /// The observer disconnected; no stage after `before` was started.
    Cancelled { before: Stage },
}

/// One strategy tried by the acquisition chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct AcquisitionAttempt {
    pub strategy: String,
    pub success: bool,

    /// Resolved source tree on success.
    #[ts(type = "string | null")]
    pub path: Option<PathBuf>,

    /// Why the strategy failed.
    pub diagnostic: Option<String>,
}

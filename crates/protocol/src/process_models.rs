//! Runtime models for provisioned tiers.
//!
//! This module defines the structures describing the two tiers of a
//! provisioned application, the environments built for them, and the
//! long-running server processes started from those environments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use ts_rs::TS;
use uuid::Uuid;

/// One of the two independently deployed halves of a provisioned application.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The interpreted backend service.
    Backend,

    /// The JavaScript-based frontend UI.
    Frontend,
}

impl Tier {
    /// Lowercase identifier used in file names and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Backend => "backend",
            Tier::Frontend => "frontend",
        }
    }

    /// Capitalized label used in human-readable progress lines.
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Backend => "Backend",
            Tier::Frontend => "Frontend",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which output stream of a child process a relayed line came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Whether a tier's runtime environment is sandboxed or uses ambient tooling.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationStatus {
    /// A dependency sandbox scoped to the tier.
    Isolated,

    /// Environment creation failed; the system-wide interpreter and package
    /// manager are used instead.
    FallbackToSystem,
}

/// A runtime environment prepared for one tier.
///
/// Holds the resolved invocation paths for the tier's interpreter and package
/// manager. For the backend these point into the isolated environment when
/// isolation succeeded, or at the ambient tools otherwise.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct RuntimeEnvironment {
    pub tier: Tier,

    /// Directory holding the tier's source code.
    #[ts(type = "string")]
    pub tier_dir: PathBuf,

    /// Root of the isolated environment, if one was created.
    #[ts(type = "string | null")]
    pub root: Option<PathBuf>,

    pub isolation: IsolationStatus,

    /// Interpreter used to run the tier (python, node).
    #[ts(type = "string")]
    pub interpreter: PathBuf,

    /// Package manager used to install dependencies (pip, npm).
    #[ts(type = "string")]
    pub package_manager: PathBuf,
}

/// Readiness state of a managed server process.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub enum Readiness {
    /// Spawned, readiness not yet established.
    Starting,

    /// The health probe answered with a non-error status.
    Ready,

    /// The polling budget ran out before the probe succeeded.
    TimedOut,
}

/// Result of polling a tier's health endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessOutcome {
    Ready {
        /// Number of probes sent, including the successful one.
        attempts: u32,
    },
    TimedOut {
        attempts: u32,
    },
}

impl ReadinessOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ReadinessOutcome::Ready { attempts } | ReadinessOutcome::TimedOut { attempts } => {
                *attempts
            }
        }
    }
}

/// A long-running tier server process started by the supervisor.
///
/// This is the observable view of the process. The subprocess handle itself
/// stays inside the supervisor, which is the only component allowed to read
/// its output or terminate it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ManagedProcess {
    #[ts(type = "string")]
    pub id: Uuid,

    pub tier: Tier,

    /// Program followed by its arguments.
    pub command: Vec<String>,

    #[ts(type = "string")]
    pub working_dir: PathBuf,

    /// OS process id, when the platform reported one.
    pub pid: Option<u32>,

    pub readiness: Readiness,

    pub started_at: DateTime<Utc>,
}

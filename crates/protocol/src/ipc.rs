//! Observer communication protocol.
//!
//! The pipeline talks to exactly one observer through a one-way stream of
//! [`ProgressEvent`]s. Internally events are tagged variants; on the wire each
//! event is rendered to a single human-readable line by [`ProgressEvent::render`].
//! Lines carry fixed marker glyphs for milestones but no machine-parseable
//! structure.
//!
//! Out-of-band status queries are answered with a [`StatusSnapshot`]:
//! ```json
//! { "backend_running": true, "frontend_running": false }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::pipeline_models::Stage;
use crate::process_models::{OutputStream, Tier};

/// Events emitted by the pipeline to its observer.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "stageStarted",
///   "payload": { "stage": "acquire-source" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// Free-form narration.
    Info { message: String },

    /// A stage has begun.
    StageStarted { stage: Stage },

    /// A stage has finished without a fatal result.
    StageCompleted { stage: Stage, summary: String },

    /// A fallback decision or degraded guarantee.
    Warning { message: String },

    /// The run is aborting.
    Fatal { message: String },

    /// A line read from a child process.
    ProcessOutput {
        source: String,
        stream: OutputStream,
        line: String,
    },

    /// A tier answered its health probe.
    Ready { tier: Tier, url: String },

    /// A positive milestone.
    Success { message: String },

    /// Every stage ran.
    Finished,
}

impl ProgressEvent {
    pub fn info(message: impl Into<String>) -> Self {
        ProgressEvent::Info {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        ProgressEvent::Warning {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ProgressEvent::Fatal {
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        ProgressEvent::Success {
            message: message.into(),
        }
    }

    /// Render the event as the line sent over the wire.
    pub fn render(&self) -> String {
        match self {
            ProgressEvent::Info { message } => message.clone(),
            ProgressEvent::StageStarted { stage } => {
                format!("STEP {}: {}...", stage.number(), stage.title())
            }
            ProgressEvent::StageCompleted { stage, summary } => {
                format!("✅ STEP {} COMPLETE: {summary}", stage.number())
            }
            ProgressEvent::Warning { message } => format!("⚠️ {message}"),
            ProgressEvent::Fatal { message } => format!("❌ ERROR: {message}"),
            ProgressEvent::ProcessOutput {
                source,
                stream,
                line,
            } => match stream {
                OutputStream::Stdout => format!("Process output ({source}): {line}"),
                OutputStream::Stderr => format!("Process error ({source}): {line}"),
            },
            ProgressEvent::Ready { tier, url } => {
                format!("✅ {} server is running and responding on {url}", tier.label())
            }
            ProgressEvent::Success { message } => format!("✅ {message}"),
            ProgressEvent::Finished => {
                "🎉 SETUP COMPLETE! Both services are now running.".to_string()
            }
        }
    }
}

/// Coarse status of the most recent run, answered to status queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct StatusSnapshot {
    pub backend_running: bool,
    pub frontend_running: bool,
}

impl StatusSnapshot {
    pub fn is_running(&self, tier: Tier) -> bool {
        match tier {
            Tier::Backend => self.backend_running,
            Tier::Frontend => self.frontend_running,
        }
    }
}

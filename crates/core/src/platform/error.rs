//! Error types for platform operations.

use thiserror::Error;

/// Errors raised while running or spawning external programs.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The program could not be started at all.
    #[error("Failed to spawn command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The program is not available on this host.
    #[error("Command '{command}' unavailable: {reason}")]
    Unavailable { command: String, reason: String },
}

//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Provision and run a two-tier repository on demand.
#[derive(Debug, Parser)]
#[command(name = "repo-runner", version, about)]
pub struct Cli {
    /// Configuration file to load instead of `./repo-runner.toml`.
    #[arg(long, global = true, env = "REPO_RUNNER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve the status API and the run websocket (default).
    Serve,

    /// Check tools, ports and the repository layout, then exit.
    Doctor,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

//! Configuration models for `repo-runner.toml`.
//!
//! Every field has a default, so a missing file or a partial file yields the
//! reference provisioning behavior.
//!
//! # Example
//!
//! ```toml
//! # repo-runner.toml
//! [repository]
//! name = "aichatbot"
//! remote_url = "https://github.com/AmruthaYalla04/aichatbot.git"
//!
//! [backend]
//! port = 8000
//! ready_timeout_secs = 20
//!
//! [supervisor]
//! launch_mode = "detached"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use ts_rs::TS;

use crate::process_models::Tier;

/// Complete provisioning configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(default)]
pub struct ProvisionConfig {
    pub repository: RepositoryConfig,
    pub workspace: WorkspaceConfig,
    pub backend: BackendConfig,
    pub frontend: FrontendConfig,
    pub supervisor: SupervisorConfig,
    pub server: ServerConfig,
}

impl ProvisionConfig {
    /// Port a provisioned tier listens on.
    pub fn tier_port(&self, tier: Tier) -> u16 {
        match tier {
            Tier::Backend => self.backend.port,
            Tier::Frontend => self.frontend.port,
        }
    }

    /// Root URL of a provisioned tier, used both for readiness probes and in
    /// the final summary.
    pub fn tier_url(&self, tier: Tier) -> String {
        format!("http://localhost:{}", self.tier_port(tier))
    }

    /// Wall-clock readiness budget for a tier.
    pub fn ready_timeout(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Backend => Duration::from_secs(self.backend.ready_timeout_secs),
            Tier::Frontend => Duration::from_secs(self.frontend.ready_timeout_secs),
        }
    }
}

/// Where the source code comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Directory name of the clone under the work directory.
    pub name: String,

    /// Version-control remote for the shallow clone strategy.
    pub remote_url: String,

    /// Compressed (`.tar.gz`) snapshot of the default branch.
    pub archive_url: String,

    /// Top-level directory the archive extracts to.
    pub archive_root: String,

    /// Optional subdirectory holding both tiers. Falls back to the tree root.
    pub base_subdir: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "aichatbot".to_string(),
            remote_url: "https://github.com/AmruthaYalla04/aichatbot.git".to_string(),
            archive_url:
                "https://github.com/AmruthaYalla04/aichatbot/archive/refs/heads/main.tar.gz"
                    .to_string(),
            archive_root: "aichatbot-main".to_string(),
            base_subdir: "chatbot".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory acquired trees are placed in. Relative paths resolve against
    /// the directory the configuration was loaded from.
    #[ts(type = "string")]
    pub work_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("cloned_repos"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct BackendConfig {
    pub dir: String,
    pub host: String,
    pub port: u16,

    /// Isolated environment directory, relative to the backend directory.
    pub env_dir: String,

    /// Dependency manifest, relative to the backend directory.
    pub manifest: String,

    /// ASGI application in `module:attribute` form.
    pub app: String,

    pub ready_timeout_secs: u64,

    /// Packages installed by the last rung of the install ladder.
    pub minimal_packages: Vec<String>,
}

impl BackendConfig {
    /// Source file the ASGI application module lives in.
    pub fn entry_file(&self) -> String {
        let module = self.app.split(':').next().unwrap_or(&self.app);
        format!("{}.py", module.replace('.', "/"))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            dir: "backend".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            env_dir: "venv".to_string(),
            manifest: "requirements.txt".to_string(),
            app: "main:app".to_string(),
            ready_timeout_secs: 20,
            minimal_packages: vec![
                "fastapi".to_string(),
                "uvicorn".to_string(),
                "websockets".to_string(),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct FrontendConfig {
    pub dir: String,
    pub port: u16,
    pub manifest: String,
    pub ready_timeout_secs: u64,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            dir: "frontend".to_string(),
            port: 3000,
            manifest: "package.json".to_string(),
            ready_timeout_secs: 30,
        }
    }
}

/// How tier server processes are launched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Output streams are piped and relayed to the observer.
    #[default]
    Attached,

    /// The process is detached from the orchestrator with its output discarded.
    Detached,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct SupervisorConfig {
    pub poll_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub launch_mode: LaunchMode,
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            probe_timeout_ms: 2000,
            launch_mode: LaunchMode::Attached,
        }
    }
}

/// Ports the orchestrator itself is hosted on. These must never overlap with
/// the provisioned tiers' ports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub api_port: u16,
    pub ui_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            api_port: 8002,
            ui_port: 3002,
        }
    }
}

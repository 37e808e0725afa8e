//! Resolved configuration.
//!
//! This module provides the `AppConfig` structure that pairs the parsed
//! `ProvisionConfig` with the directory it was loaded from, so relative paths
//! resolve the same way no matter where the process was started.

use rr_protocol::config_models::ProvisionConfig;
use rr_protocol::process_models::Tier;
use std::path::{Path, PathBuf};

/// Provisioning configuration anchored at a root directory.
///
/// # Example
///
/// ```rust,no_run
/// use rr_core::config::loader::load_config;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("."), None)?;
/// println!("Acquired trees go to {}", config.work_dir().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory relative paths are resolved against.
    pub root: PathBuf,

    /// Parsed settings.
    pub provision: ProvisionConfig,
}

impl AppConfig {
    pub fn new(root: impl Into<PathBuf>, provision: ProvisionConfig) -> Self {
        Self {
            root: root.into(),
            provision,
        }
    }

    /// Absolute work directory acquired trees are placed in.
    pub fn work_dir(&self) -> PathBuf {
        resolve(&self.root, &self.provision.workspace.work_dir)
    }

    /// Default destination of the shallow clone.
    pub fn repo_path(&self) -> PathBuf {
        self.work_dir().join(&self.provision.repository.name)
    }

    /// Directory the archive strategy extracts to.
    pub fn archive_path(&self) -> PathBuf {
        self.work_dir().join(&self.provision.repository.archive_root)
    }

    /// Directory name of a tier inside the base directory.
    pub fn tier_dir_name(&self, tier: Tier) -> &str {
        match tier {
            Tier::Backend => &self.provision.backend.dir,
            Tier::Frontend => &self.provision.frontend.dir,
        }
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

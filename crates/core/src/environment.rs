//! Tier runtime environments.
//!
//! For the backend this creates an isolated Python environment under the
//! tier directory, falling back to the ambient interpreter when creation
//! fails, and installs dependencies through a three-rung ladder:
//!
//! 1. the environment's package manager with the manifest,
//! 2. the interpreter's `-m pip` form with the manifest,
//! 3. the minimal package set needed to start the server.
//!
//! For the frontend it ensures a package manifest exists and runs the JS
//! package manager, retrying once through the system shell.
//!
//! Failures here never abort a run. Each builder call returns the warnings it
//! collected; the caller decides how to report them.

use crate::fallback::{CommandStrategy, FallbackLadder, LadderOutcome};
use crate::platform::{Invocation, PlatformOps};
use crate::progress::ProgressChannel;
use crate::scaffold::{ensure_manifest, ManifestStatus};
use rr_protocol::config_models::{BackendConfig, FrontendConfig};
use rr_protocol::process_models::{IsolationStatus, RuntimeEnvironment, Tier};
use std::path::{Path, PathBuf};

/// An environment plus the degradations met while building it.
#[derive(Debug, Clone)]
pub struct EnvironmentBuild {
    pub environment: RuntimeEnvironment,
    pub warnings: Vec<String>,
}

/// Builds and populates tier environments.
pub struct EnvironmentBuilder<'a> {
    platform: &'a dyn PlatformOps,
    progress: &'a ProgressChannel,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(platform: &'a dyn PlatformOps, progress: &'a ProgressChannel) -> Self {
        Self { platform, progress }
    }

    /// Create the backend's isolated environment.
    ///
    /// A previous environment directory is removed first. If creation fails,
    /// or the expected executables are missing afterwards, the environment
    /// degrades to [`IsolationStatus::FallbackToSystem`].
    pub async fn build_backend(&self, tier_dir: &Path, config: &BackendConfig) -> EnvironmentBuild {
        let family = self.platform.family();
        let env_root = tier_dir.join(&config.env_dir);
        let mut warnings = Vec::new();

        if self.platform.exists(&env_root).await {
            self.progress
                .info("Removing existing virtual environment...")
                .await;
            if !self.platform.force_remove(&env_root).await {
                self.progress
                    .info(format!(
                        "Could not fully remove {}, creating over it",
                        env_root.display()
                    ))
                    .await;
            }
        }

        let system_python = self.system_tool(family.system_python());
        let create = Invocation::new(&system_python)
            .args(["-m", "venv", config.env_dir.as_str()])
            .current_dir(tier_dir);
        self.progress
            .info(format!("Running: {}", create.display()))
            .await;

        let created = match self.platform.run(&create).await {
            Ok(output) if output.success() => self.verify_env(&env_root).await,
            Ok(output) => Err(crate::fallback::describe_failure(
                output.code,
                &output.stderr,
                &output.stdout,
            )),
            Err(e) => Err(e.to_string()),
        };

        let environment = match created {
            Ok(()) => {
                self.progress
                    .info(format!("Virtual environment created at {}", env_root.display()))
                    .await;
                RuntimeEnvironment {
                    tier: Tier::Backend,
                    tier_dir: tier_dir.to_path_buf(),
                    interpreter: family.env_executable(&env_root, "python"),
                    package_manager: family.env_executable(&env_root, "pip"),
                    root: Some(env_root),
                    isolation: IsolationStatus::Isolated,
                }
            }
            Err(reason) => {
                warnings.push(format!(
                    "Virtual environment creation failed ({reason}); using system Python"
                ));
                RuntimeEnvironment {
                    tier: Tier::Backend,
                    tier_dir: tier_dir.to_path_buf(),
                    root: None,
                    isolation: IsolationStatus::FallbackToSystem,
                    interpreter: system_python,
                    package_manager: self.system_tool(family.system_pip()),
                }
            }
        };

        EnvironmentBuild {
            environment,
            warnings,
        }
    }

    async fn verify_env(&self, env_root: &Path) -> Result<(), String> {
        let family = self.platform.family();
        let bin_dir = family.env_bin_dir(env_root);
        if !self.platform.exists(&bin_dir).await {
            return Err(format!("{} is missing", bin_dir.display()));
        }
        for tool in ["python", "pip"] {
            let executable = family.env_executable(env_root, tool);
            if !self.platform.exists(&executable).await {
                return Err(format!("{} is missing", executable.display()));
            }
        }
        Ok(())
    }

    /// Install backend dependencies into `environment`.
    ///
    /// Synthesizes a minimal manifest if the tier has none. Only exhaustion
    /// of every rung yields a warning.
    pub async fn install_backend(
        &self,
        environment: &RuntimeEnvironment,
        config: &BackendConfig,
    ) -> Vec<String> {
        let tier_dir = &environment.tier_dir;
        let mut warnings = Vec::new();

        self.ensure_manifest(Tier::Backend, tier_dir, &config.manifest, &mut warnings)
            .await;

        let manifest = config.manifest.as_str();
        let ladder = FallbackLadder::new()
            .then(CommandStrategy::new(
                "package manager",
                self.platform,
                Invocation::new(&environment.package_manager)
                    .args(["install", "-r", manifest])
                    .current_dir(tier_dir),
            ))
            .then(CommandStrategy::new(
                "interpreter module",
                self.platform,
                Invocation::new(&environment.interpreter)
                    .args(["-m", "pip", "install", "-r", manifest])
                    .current_dir(tier_dir),
            ))
            .then(CommandStrategy::new(
                "minimal packages",
                self.platform,
                Invocation::new(&environment.interpreter)
                    .args(["-m", "pip", "install"])
                    .args(config.minimal_packages.iter().cloned())
                    .current_dir(tier_dir),
            ));

        self.progress.info("Installing Python dependencies...").await;
        let outcome = ladder.run().await;
        self.narrate_ladder(&outcome, "Python dependencies").await;
        if !outcome.succeeded() {
            warnings.push(format!(
                "All dependency install attempts failed ({}); continuing in case packages are already present",
                outcome.failure_summary()
            ));
        }

        let entry = config.entry_file();
        if !self.platform.exists(&tier_dir.join(&entry)).await {
            warnings.push(format!(
                "{entry} not found in {}; the backend may fail to start",
                tier_dir.display()
            ));
        }

        warnings
    }

    /// Ensure the frontend manifest and install its dependencies.
    pub async fn build_frontend(&self, tier_dir: &Path, config: &FrontendConfig) -> EnvironmentBuild {
        let family = self.platform.family();
        let mut warnings = Vec::new();

        self.ensure_manifest(Tier::Frontend, tier_dir, &config.manifest, &mut warnings)
            .await;

        let npm = self.system_tool(family.npm());
        let ladder = FallbackLadder::new()
            .then(CommandStrategy::new(
                "npm",
                self.platform,
                Invocation::new(&npm).arg("install").current_dir(tier_dir),
            ))
            .then(CommandStrategy::new(
                "shell",
                self.platform,
                family.shell("npm install").current_dir(tier_dir),
            ));

        self.progress.info("Running npm install...").await;
        let outcome = ladder.run().await;
        self.narrate_ladder(&outcome, "Frontend dependencies").await;
        if !outcome.succeeded() {
            warnings.push(format!(
                "npm install failed ({}); will attempt to continue anyway",
                outcome.failure_summary()
            ));
        }

        let modules = tier_dir.join("node_modules");
        let isolation = if self.platform.exists(&modules).await {
            IsolationStatus::Isolated
        } else {
            IsolationStatus::FallbackToSystem
        };

        EnvironmentBuild {
            environment: RuntimeEnvironment {
                tier: Tier::Frontend,
                tier_dir: tier_dir.to_path_buf(),
                root: Some(modules),
                isolation,
                interpreter: self.system_tool("node"),
                package_manager: npm,
            },
            warnings,
        }
    }

    async fn ensure_manifest(
        &self,
        tier: Tier,
        tier_dir: &Path,
        file_name: &str,
        warnings: &mut Vec<String>,
    ) {
        match ensure_manifest(tier, tier_dir, file_name) {
            Ok(ManifestStatus::Created) => {
                self.progress
                    .info(format!(
                        "{file_name} not found. Created one with basic dependencies"
                    ))
                    .await;
            }
            Ok(ManifestStatus::Existing) => {}
            Err(e) => warnings.push(format!("Could not write {file_name}: {e}")),
        }
    }

    async fn narrate_ladder(&self, outcome: &LadderOutcome<()>, what: &str) {
        for attempt in outcome.attempts.iter().filter(|a| !a.success) {
            self.progress
                .info(format!(
                    "Install via {} failed: {}",
                    attempt.strategy,
                    attempt.diagnostic.as_deref().unwrap_or("unknown error")
                ))
                .await;
        }
        if let Some(winner) = outcome.winner() {
            self.progress
                .info(format!("{what} installed via {winner}"))
                .await;
        }
    }

    /// Resolved path of an ambient tool, or its bare name.
    fn system_tool(&self, name: &str) -> PathBuf {
        self.platform
            .resolve_tool(name)
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

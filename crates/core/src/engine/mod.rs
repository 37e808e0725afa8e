//! Pipeline execution engine.
//!
//! The PipelineEngine drives the ten provisioning stages strictly in order,
//! decides between aborting and degrading after each one, and narrates every
//! transition and fallback decision to the observer.
//!
//! Only structurally absent inputs stop a run: the source tree and the two
//! tier directories. Environment, install and readiness failures are recorded
//! as warnings and the run continues.

use crate::acquisition::{self, download_client, prepare_destination, SourceRequest};
use crate::config::models::AppConfig;
use crate::environment::EnvironmentBuilder;
use crate::platform::{self, Invocation, PlatformOps};
use crate::progress::ProgressChannel;
use crate::scaffold::{write_launcher, LauncherVars};
use crate::state::run::{begin_stage, cancel_run, complete_run, record_stage, PipelineRun};
use crate::state::status::SharedStatus;
use crate::supervisor::{
    backend_invocation, frontend_invocation, HttpProbe, ProcessSupervisor, ReadinessProbe,
};
use anyhow::Result;
use rr_protocol::pipeline_models::{Stage, StageResult};
use rr_protocol::process_models::{IsolationStatus, RuntimeEnvironment, Tier};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a stage produced, before it is recorded.
struct StepReport {
    result: StageResult,
    summary: String,
}

impl StepReport {
    fn done(summary: impl Into<String>) -> Self {
        Self {
            result: StageResult::Completed,
            summary: summary.into(),
        }
    }

    fn with_warnings(warnings: Vec<String>, summary: impl Into<String>) -> Self {
        Self {
            result: StageResult::from_warnings(warnings),
            summary: summary.into(),
        }
    }

    fn fatal(reason: impl Into<String>) -> Self {
        Self {
            result: StageResult::Fatal(reason.into()),
            summary: String::new(),
        }
    }
}

/// The main provisioning engine.
pub struct PipelineEngine {
    config: AppConfig,
    platform: Arc<dyn PlatformOps>,
    client: reqwest::Client,
    supervisor: ProcessSupervisor,
}

impl PipelineEngine {
    /// Create an engine from its collaborators.
    pub fn new(
        config: AppConfig,
        platform: Arc<dyn PlatformOps>,
        probe: Arc<dyn ReadinessProbe>,
        client: reqwest::Client,
    ) -> Self {
        let supervisor = ProcessSupervisor::new(
            Arc::clone(&platform),
            probe,
            config.provision.supervisor.launch_mode,
        );
        Self {
            config,
            platform,
            client,
            supervisor,
        }
    }

    /// Create an engine for the running host: the native platform, an HTTP
    /// readiness probe and the archive download client.
    pub fn native(config: AppConfig) -> Result<Self> {
        let probe = HttpProbe::new(config.provision.supervisor.probe_timeout())?;
        let client = download_client()?;
        Ok(Self::new(config, platform::native(), Arc::new(probe), client))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Execute one provisioning run and return its final state.
    ///
    /// `status` is reset when the run starts and each tier is marked running
    /// once its start stage completes. If the observer goes away, the run
    /// stops before the next stage; processes already started keep running.
    pub async fn run(&self, status: &SharedStatus, progress: &ProgressChannel) -> PipelineRun {
        status.reset();
        let mut run = PipelineRun::new(self.config.work_dir());
        tracing::info!(run = %run.id, "Starting provisioning run");
        self.announce(progress).await;

        for stage in Stage::ALL {
            if progress.is_disconnected() {
                cancel_run(&mut run, stage);
                break;
            }

            begin_stage(stage, progress).await;
            let report = self.execute(stage, &mut run, progress).await;
            record_stage(&mut run, stage, report.result, &report.summary, progress).await;
            if run.is_finished() {
                break;
            }

            match stage {
                Stage::StartBackend => status.set_running(Tier::Backend),
                Stage::StartFrontend => status.set_running(Tier::Frontend),
                _ => {}
            }
        }

        if !run.is_finished() {
            complete_run(&mut run, progress).await;
        }
        tracing::info!(run = %run.id, outcome = ?run.outcome, "Provisioning run ended");
        run
    }

    async fn announce(&self, progress: &ProgressChannel) {
        let provision = &self.config.provision;
        progress.info("Starting repository clone and setup...").await;
        progress
            .info(format!(
                "Note: Main application runs on ports {}/{}",
                provision.server.ui_port, provision.server.api_port
            ))
            .await;
        progress
            .info(format!(
                "Note: Cloned repository will run on ports {}/{}",
                provision.frontend.port, provision.backend.port
            ))
            .await;
    }

    async fn execute(
        &self,
        stage: Stage,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        match stage {
            Stage::PrepareWorkspace => self.prepare_workspace(run, progress).await,
            Stage::AcquireSource => self.acquire_source(run, progress).await,
            Stage::LocateBase => self.locate_base(run, progress).await,
            Stage::LocateBackend => self.locate_tier(Tier::Backend, run, progress).await,
            Stage::BuildBackendEnv => self.build_backend_env(run, progress).await,
            Stage::InstallBackendDeps => self.install_backend_deps(run, progress).await,
            Stage::StartBackend => self.start_backend(run, progress).await,
            Stage::LocateFrontend => self.locate_tier(Tier::Frontend, run, progress).await,
            Stage::StartFrontend => self.start_frontend(run, progress).await,
            Stage::Summary => self.summarize(progress).await,
        }
    }

    async fn prepare_workspace(
        &self,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let work_dir = self.config.work_dir();
        let repo_path = self.config.repo_path();
        let archive_path = self.config.archive_path();

        for path in [&repo_path, &archive_path] {
            if self.platform.exists(path).await {
                progress
                    .info(format!("Found existing directory. Cleaning {}...", path.display()))
                    .await;
            }
        }

        let prepared = prepare_destination(
            self.platform.as_ref(),
            &work_dir,
            &repo_path,
            std::slice::from_ref(&archive_path),
        )
        .await;
        progress
            .info(format!("Working directory: {}", work_dir.display()))
            .await;

        for leftover in &prepared.leftovers {
            progress
                .info(format!("Could not remove directory {}", leftover.display()))
                .await;
        }
        if prepared.rotated {
            progress
                .info(format!(
                    "Using alternative directory: {}",
                    prepared.destination.display()
                ))
                .await;
        }

        run.destination = Some(prepared.destination);
        StepReport::done("Environment prepared")
    }

    async fn acquire_source(
        &self,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let repository = &self.config.provision.repository;
        let destination = run
            .destination
            .clone()
            .unwrap_or_else(|| self.config.repo_path());

        progress
            .info(format!("Cloning repository from {}...", repository.remote_url))
            .await;

        let request = SourceRequest {
            remote_url: repository.remote_url.clone(),
            archive_url: repository.archive_url.clone(),
            work_dir: run.work_dir.clone(),
            destination,
            archive_root: repository.archive_root.clone(),
        };
        let report =
            acquisition::acquire(self.platform.as_ref(), &self.client, &request, progress).await;

        for attempt in &report.attempts {
            match (&attempt.path, &attempt.diagnostic) {
                (Some(path), _) if attempt.success => {
                    progress
                        .info(format!(
                            "Repository acquired via {} at {}",
                            attempt.strategy,
                            path.display()
                        ))
                        .await;
                }
                (_, Some(diagnostic)) => {
                    progress
                        .info(format!("{} failed: {}", attempt.strategy, diagnostic))
                        .await;
                }
                _ => {}
            }
        }

        run.acquisition = report.attempts;
        match report.source_tree {
            Some(tree) => {
                run.source_tree = Some(tree);
                StepReport::done("Repository downloaded successfully")
            }
            None => StepReport::fatal(
                "Failed to acquire the repository with every available method. Cannot continue.",
            ),
        }
    }

    async fn locate_base(
        &self,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let Some(tree) = run.source_tree.clone() else {
            return StepReport::fatal("No source tree to search. Cannot continue.");
        };
        let subdir = self.config.provision.repository.base_subdir.as_str();
        let base = find_base_dir(self.platform.as_ref(), &tree, subdir).await;

        if base == tree {
            if !subdir.is_empty() {
                progress
                    .info(format!(
                        "No {subdir} directory found. Using repository root: {}",
                        tree.display()
                    ))
                    .await;
            }
        } else {
            progress
                .info(format!("Found {subdir} directory at {}", base.display()))
                .await;
        }

        let summary = format!("Base directory set to {}", base.display());
        run.base_dir = Some(base);
        StepReport::done(summary)
    }

    async fn locate_tier(
        &self,
        tier: Tier,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let Some(base) = run.base_dir.clone() else {
            return StepReport::fatal("No base directory was resolved. Cannot continue.");
        };
        let dir = base.join(self.config.tier_dir_name(tier));

        if !self.platform.exists(&dir).await {
            return StepReport::fatal(format!(
                "{} directory not found in {}. Cannot continue.",
                tier.label(),
                base.display()
            ));
        }

        progress
            .info(format!("{} directory found at {}", tier.label(), dir.display()))
            .await;
        match tier {
            Tier::Backend => run.backend_dir = Some(dir),
            Tier::Frontend => run.frontend_dir = Some(dir),
        }
        StepReport::done(format!("{} directory located", tier.label()))
    }

    async fn build_backend_env(
        &self,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let Some(dir) = run.backend_dir.clone() else {
            return StepReport::fatal("Backend directory not found. Cannot continue.");
        };
        let builder = EnvironmentBuilder::new(self.platform.as_ref(), progress);
        let build = builder
            .build_backend(&dir, &self.config.provision.backend)
            .await;

        let summary = match build.environment.isolation {
            IsolationStatus::Isolated => "Virtual environment setup",
            IsolationStatus::FallbackToSystem => "Using system Python",
        };
        run.backend_env = Some(build.environment);
        StepReport::with_warnings(build.warnings, summary)
    }

    async fn install_backend_deps(
        &self,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let Some(environment) = run.backend_env.as_ref() else {
            return StepReport::with_warnings(
                vec!["No backend environment was built; skipping dependency install".to_string()],
                "Dependency installation skipped",
            );
        };
        let builder = EnvironmentBuilder::new(self.platform.as_ref(), progress);
        let warnings = builder
            .install_backend(environment, &self.config.provision.backend)
            .await;
        StepReport::with_warnings(warnings, "Dependency installation process finished")
    }

    async fn start_backend(
        &self,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let backend = &self.config.provision.backend;
        let Some(environment) = run.backend_env.clone() else {
            return StepReport::with_warnings(
                vec!["No backend environment was built; not starting the backend".to_string()],
                "Backend start skipped",
            );
        };
        let mut warnings = Vec::new();

        let vars = LauncherVars {
            dir: environment.tier_dir.clone(),
            host: backend.host.clone(),
            port: backend.port,
            app: backend.app.clone(),
            python: environment.interpreter.clone(),
            npm: self.platform.family().npm().to_string(),
        };
        self.write_tier_launcher(Tier::Backend, &environment, &vars, progress, &mut warnings)
            .await;

        progress
            .info(format!("Starting backend server on port {}...", backend.port))
            .await;
        self.launch(
            Tier::Backend,
            backend_invocation(&environment, backend),
            run,
            progress,
            &mut warnings,
        )
        .await;

        StepReport::with_warnings(warnings, "Backend is now running")
    }

    async fn start_frontend(
        &self,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
    ) -> StepReport {
        let frontend = &self.config.provision.frontend;
        let Some(dir) = run.frontend_dir.clone() else {
            return StepReport::fatal("Frontend directory not found. Cannot continue.");
        };

        let builder = EnvironmentBuilder::new(self.platform.as_ref(), progress);
        let build = builder.build_frontend(&dir, frontend).await;
        let mut warnings = build.warnings;
        let environment = build.environment;
        run.frontend_env = Some(environment.clone());

        let vars = LauncherVars {
            dir: environment.tier_dir.clone(),
            host: "localhost".to_string(),
            port: frontend.port,
            app: String::new(),
            python: PathBuf::new(),
            npm: self.platform.family().npm().to_string(),
        };
        self.write_tier_launcher(Tier::Frontend, &environment, &vars, progress, &mut warnings)
            .await;

        progress
            .info(format!("Starting frontend server on port {}...", frontend.port))
            .await;
        self.launch(
            Tier::Frontend,
            frontend_invocation(&environment, frontend),
            run,
            progress,
            &mut warnings,
        )
        .await;

        StepReport::with_warnings(warnings, "Frontend server is running")
    }

    async fn summarize(&self, progress: &ProgressChannel) -> StepReport {
        let provision = &self.config.provision;
        progress
            .success(format!("Backend API: {}", provision.tier_url(Tier::Backend)))
            .await;
        progress
            .success(format!("Frontend UI: {}", provision.tier_url(Tier::Frontend)))
            .await;
        StepReport::done("Access URLs ready")
    }

    /// Start a tier and wait for it to answer. A failed start or an exhausted
    /// readiness budget becomes a warning.
    async fn launch(
        &self,
        tier: Tier,
        invocation: Invocation,
        run: &mut PipelineRun,
        progress: &ProgressChannel,
        warnings: &mut Vec<String>,
    ) {
        let provision = &self.config.provision;
        let mut process = match self.supervisor.start(tier, invocation, progress).await {
            Ok(process) => process,
            Err(e) => {
                warnings.push(format!("Error starting {tier}: {e}"));
                return;
            }
        };
        if let Some(pid) = process.pid {
            progress
                .info(format!("{} process started with PID {pid}", tier.label()))
                .await;
        }

        let budget = provision.ready_timeout(tier);
        let outcome = self
            .supervisor
            .await_ready(
                &mut process,
                &provision.tier_url(tier),
                budget,
                provision.supervisor.poll_interval(),
                progress,
            )
            .await;
        if !outcome.is_ready() {
            warnings.push(format!(
                "{} did not respond within {}s; assuming it is still starting",
                tier.label(),
                budget.as_secs()
            ));
        }
        run.processes.push(process);
    }

    async fn write_tier_launcher(
        &self,
        tier: Tier,
        environment: &RuntimeEnvironment,
        vars: &LauncherVars,
        progress: &ProgressChannel,
        warnings: &mut Vec<String>,
    ) {
        match write_launcher(tier, self.platform.family(), &environment.tier_dir, vars) {
            Ok(path) => {
                progress
                    .info(format!("Created launcher script {}", path.display()))
                    .await;
            }
            Err(e) => warnings.push(format!("Could not write {tier} launcher: {e}")),
        }
    }
}

/// `tree/subdir` when it is a directory, otherwise the tree root.
pub(crate) async fn find_base_dir(
    platform: &dyn PlatformOps,
    tree: &Path,
    subdir: &str,
) -> PathBuf {
    if subdir.is_empty() {
        return tree.to_path_buf();
    }
    let candidate = tree.join(subdir);
    if platform.is_dir(&candidate).await {
        candidate
    } else {
        tree.to_path_buf()
    }
}

//! Pre-flight diagnostics.
//!
//! Checks that the host can run a provisioning pipeline: the required tools
//! are on `PATH`, none of the orchestrator or tier ports is taken, and the
//! configured repository can be acquired and has the expected layout.
//! Nothing here changes the work directory; the repository is acquired into a
//! temporary directory that is dropped afterwards.

use crate::acquisition::{self, SourceRequest};
use crate::config::models::AppConfig;
use crate::engine::find_base_dir;
use crate::platform::{self, PlatformOps};
use crate::progress::{ProgressChannel, DEFAULT_CAPACITY};
use anyhow::{Context, Result};
use rr_protocol::process_models::Tier;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Area a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Tools,
    Ports,
    Repository,
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Section::Tools => "Required software",
            Section::Ports => "Ports",
            Section::Repository => "Repository",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warning,
    Issue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub section: Section,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn ok(section: Section, message: impl Into<String>) -> Self {
        Self {
            section,
            severity: Severity::Ok,
            message: message.into(),
        }
    }

    fn warning(section: Section, message: impl Into<String>) -> Self {
        Self {
            section,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    fn issue(section: Section, message: impl Into<String>) -> Self {
        Self {
            section,
            severity: Severity::Issue,
            message: message.into(),
        }
    }
}

/// Everything the diagnostics found, in check order.
#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub findings: Vec<Finding>,
}

impl DoctorReport {
    pub fn issues(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Issue)
    }

    pub fn is_healthy(&self) -> bool {
        self.issues().next().is_none()
    }
}

pub struct Doctor {
    config: AppConfig,
    platform: Arc<dyn PlatformOps>,
    download: reqwest::Client,
    probe: reqwest::Client,
}

impl Doctor {
    pub fn new(
        config: AppConfig,
        platform: Arc<dyn PlatformOps>,
        download: reqwest::Client,
    ) -> Result<Self> {
        let probe = reqwest::Client::builder()
            .timeout(PORT_PROBE_TIMEOUT)
            .build()
            .context("Failed to build port probe client")?;
        Ok(Self {
            config,
            platform,
            download,
            probe,
        })
    }

    pub fn native(config: AppConfig) -> Result<Self> {
        let download = acquisition::download_client()?;
        Self::new(config, platform::native(), download)
    }

    /// Run every check.
    pub async fn run(&self) -> Result<DoctorReport> {
        let mut report = DoctorReport::default();
        report.findings.extend(self.check_tools());
        report.findings.extend(self.check_ports().await);
        report.findings.extend(self.check_repository().await?);
        Ok(report)
    }

    /// `git`, the Python interpreter, `node` and `npm` on `PATH`.
    ///
    /// A missing `git` is only a warning since the archive download can
    /// stand in for the clone.
    pub fn check_tools(&self) -> Vec<Finding> {
        let family = self.platform.family();
        let tools = [
            ("Git", "git", false),
            ("Python", family.system_python(), true),
            ("Node.js", "node", true),
            ("npm", family.npm(), true),
        ];

        tools
            .iter()
            .map(|(label, program, required)| {
                match self.platform.resolve_tool(program) {
                    Some(path) => Finding::ok(
                        Section::Tools,
                        format!("{label} is installed ({})", path.display()),
                    ),
                    None if *required => Finding::issue(
                        Section::Tools,
                        format!("{label} is not installed or not in PATH"),
                    ),
                    None => Finding::warning(
                        Section::Tools,
                        format!("{label} is not installed or not in PATH; archive download will be used"),
                    ),
                }
            })
            .collect()
    }

    /// Whether anything already answers on the orchestrator's and the tiers'
    /// ports.
    pub async fn check_ports(&self) -> Vec<Finding> {
        let provision = &self.config.provision;
        let ports = [
            provision.server.ui_port,
            provision.server.api_port,
            provision.tier_port(Tier::Frontend),
            provision.tier_port(Tier::Backend),
        ];

        let mut findings = Vec::with_capacity(ports.len());
        for port in ports {
            let url = format!("http://localhost:{port}");
            match self.probe.get(&url).send().await {
                Ok(_) => findings.push(Finding::issue(
                    Section::Ports,
                    format!("Port {port} is already in use"),
                )),
                Err(e) if e.is_connect() => {
                    findings.push(Finding::ok(Section::Ports, format!("Port {port} is available")))
                }
                Err(e) => findings.push(Finding::warning(
                    Section::Ports,
                    format!("Error checking port {port}: {e}"),
                )),
            }
        }
        findings
    }

    /// Acquire the repository into a scratch directory and check its layout.
    pub async fn check_repository(&self) -> Result<Vec<Finding>> {
        let repository = &self.config.provision.repository;
        let scratch = tempfile::tempdir().context("Failed to create a scratch directory")?;
        let destination = scratch.path().join(&repository.name);

        let (progress, rx) = ProgressChannel::new(DEFAULT_CAPACITY);
        drop(rx);

        let request = SourceRequest {
            remote_url: repository.remote_url.clone(),
            archive_url: repository.archive_url.clone(),
            work_dir: scratch.path().to_path_buf(),
            destination,
            archive_root: repository.archive_root.clone(),
        };
        let report =
            acquisition::acquire(self.platform.as_ref(), &self.download, &request, &progress).await;

        let Some(tree) = report.source_tree else {
            let reasons: Vec<String> = report
                .attempts
                .iter()
                .filter_map(|attempt| {
                    attempt
                        .diagnostic
                        .as_ref()
                        .map(|diagnostic| format!("{}: {diagnostic}", attempt.strategy))
                })
                .collect();
            return Ok(vec![Finding::issue(
                Section::Repository,
                format!(
                    "Could not acquire {} ({})",
                    repository.remote_url,
                    reasons.join("; ")
                ),
            )]);
        };

        let mut findings = vec![Finding::ok(
            Section::Repository,
            format!("Repository acquired from {}", repository.remote_url),
        )];
        let base = find_base_dir(self.platform.as_ref(), &tree, &repository.base_subdir).await;
        if base == tree && !repository.base_subdir.is_empty() {
            findings.push(Finding::warning(
                Section::Repository,
                format!(
                    "'{}' directory not found, checking root",
                    repository.base_subdir
                ),
            ));
        }

        let backend = &self.config.provision.backend;
        let frontend = &self.config.provision.frontend;
        findings.extend(
            check_tier(
                &base.join(&backend.dir),
                Tier::Backend,
                &[backend.entry_file().as_str(), backend.manifest.as_str()],
            )
            .await,
        );
        findings.extend(
            check_tier(
                &base.join(&frontend.dir),
                Tier::Frontend,
                &[frontend.manifest.as_str()],
            )
            .await,
        );
        Ok(findings)
    }
}

async fn check_tier(dir: &Path, tier: Tier, files: &[&str]) -> Vec<Finding> {
    if !is_dir(dir).await {
        return vec![Finding::issue(
            Section::Repository,
            format!("{} directory not found", tier.label()),
        )];
    }

    let mut findings = vec![Finding::ok(
        Section::Repository,
        format!("{} directory found", tier.label()),
    )];
    for file in files {
        let present = tokio::fs::metadata(dir.join(file))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        findings.push(if present {
            Finding::ok(Section::Repository, format!("{} {file} found", tier.label()))
        } else {
            Finding::issue(Section::Repository, format!("{} {file} not found", tier.label()))
        });
    }
    findings
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

//! Source acquisition.
//!
//! Obtains a source tree from a remote origin by trying strategies in a fixed
//! order until one succeeds:
//!
//! 1. [`ShallowClone`]: `git clone --depth 1` into a clean destination.
//! 2. [`ArchiveDownload`]: fetch a `.tar.gz` snapshot of the default branch,
//!    persist it to a temporary file, extract it, and drop the temporary file
//!    whatever the extraction outcome.
//!
//! A strategy only counts as successful when the tree it produced exists and
//! is non-empty. Nothing is fabricated when both fail.

use crate::fallback::{describe_failure, FallbackLadder, Strategy};
use crate::platform::{Invocation, PlatformOps};
use crate::progress::ProgressChannel;
use async_trait::async_trait;
use rr_protocol::pipeline_models::AcquisitionAttempt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Overall timeout of the archive download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors raised by the acquisition strategies.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive request returned HTTP {0}")]
    Status(u16),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to extract archive: {0}")]
    Extract(String),

    #[error("Expected directory {0:?} is missing or empty")]
    EmptyTree(PathBuf),
}

/// Where to fetch the source from and where to put it.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub remote_url: String,
    pub archive_url: String,
    /// Directory acquired trees are placed in.
    pub work_dir: PathBuf,
    /// Clone destination, already cleaned by [`prepare_destination`].
    pub destination: PathBuf,
    /// Top-level directory name inside the archive.
    pub archive_root: String,
}

/// What the chain tried and where the tree ended up.
#[derive(Debug, Clone)]
pub struct AcquisitionReport {
    pub attempts: Vec<AcquisitionAttempt>,
    pub source_tree: Option<PathBuf>,
}

impl AcquisitionReport {
    pub fn succeeded(&self) -> bool {
        self.source_tree.is_some()
    }
}

/// Result of cleaning the destination before acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDestination {
    /// Clean path the clone should target.
    pub destination: PathBuf,

    /// Whether the default path could not be removed and a fresh
    /// timestamp-suffixed path was chosen instead.
    pub rotated: bool,

    /// Stale paths that could not be removed.
    pub leftovers: Vec<PathBuf>,
}

/// Force-clean every prior-run artifact and pick a clean clone destination.
///
/// Deletion errors are swallowed. If `repo_path` survives deletion, the
/// destination is rotated to `<repo_path>_<timestamp>` instead of failing.
pub async fn prepare_destination(
    platform: &dyn PlatformOps,
    work_dir: &Path,
    repo_path: &Path,
    stale: &[PathBuf],
) -> PreparedDestination {
    if let Err(e) = tokio::fs::create_dir_all(work_dir).await {
        tracing::warn!("Could not create work directory {}: {}", work_dir.display(), e);
    }

    let mut leftovers = Vec::new();
    for path in std::iter::once(repo_path).chain(stale.iter().map(PathBuf::as_path)) {
        if !platform.force_remove(path).await {
            tracing::warn!("Could not fully remove {}", path.display());
            leftovers.push(path.to_path_buf());
        }
    }

    if leftovers.iter().any(|p| p == repo_path) {
        let destination = rotated_path(repo_path);
        tracing::info!("Using fresh destination {}", destination.display());
        PreparedDestination {
            destination,
            rotated: true,
            leftovers,
        }
    } else {
        PreparedDestination {
            destination: repo_path.to_path_buf(),
            rotated: false,
            leftovers,
        }
    }
}

/// `<path>_<unix seconds>` next to `path`.
pub fn rotated_path(path: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().timestamp();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    path.with_file_name(format!("{name}_{stamp}"))
}

/// Run the acquisition chain.
pub async fn acquire(
    platform: &dyn PlatformOps,
    client: &reqwest::Client,
    request: &SourceRequest,
    progress: &ProgressChannel,
) -> AcquisitionReport {
    let ladder = FallbackLadder::new()
        .then(ShallowClone::new(
            platform,
            &request.remote_url,
            &request.destination,
            progress,
        ))
        .then(ArchiveDownload::new(
            platform,
            client,
            &request.archive_url,
            &request.work_dir,
            &request.archive_root,
            progress,
        ));

    let outcome = ladder.run().await;
    let attempts = outcome
        .attempts
        .iter()
        .map(|attempt| AcquisitionAttempt {
            strategy: attempt.strategy.clone(),
            success: attempt.success,
            path: if attempt.success {
                outcome.value.clone()
            } else {
                None
            },
            diagnostic: attempt.diagnostic.clone(),
        })
        .collect();

    AcquisitionReport {
        attempts,
        source_tree: outcome.value,
    }
}

/// HTTP client used for archive downloads.
pub fn download_client() -> Result<reqwest::Client, AcquisitionError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(DOWNLOAD_TIMEOUT)
        .user_agent(concat!("repo-runner/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// `git clone --depth 1 <remote> <destination>`.
///
/// Tries each invocation form of the version-control tool in turn: the path
/// resolved on `PATH`, then the bare program name.
pub struct ShallowClone<'a> {
    platform: &'a dyn PlatformOps,
    remote_url: &'a str,
    destination: &'a Path,
    progress: &'a ProgressChannel,
}

impl<'a> ShallowClone<'a> {
    pub fn new(
        platform: &'a dyn PlatformOps,
        remote_url: &'a str,
        destination: &'a Path,
        progress: &'a ProgressChannel,
    ) -> Self {
        Self {
            platform,
            remote_url,
            destination,
            progress,
        }
    }

    fn forms(&self) -> Vec<PathBuf> {
        let mut forms = Vec::new();
        if let Some(resolved) = self.platform.resolve_tool("git") {
            forms.push(resolved);
        }
        let bare = PathBuf::from("git");
        if !forms.contains(&bare) {
            forms.push(bare);
        }
        forms
    }

    async fn clone_with(&self, program: PathBuf) -> Result<(), String> {
        let invocation = Invocation::new(program)
            .args(["clone", "--depth", "1", self.remote_url])
            .arg(self.destination.to_string_lossy())
            .env("GIT_TERMINAL_PROMPT", "0");

        self.progress
            .info(format!("Running: {}", invocation.display()))
            .await;
        let output = self
            .platform
            .run(&invocation)
            .await
            .map_err(|e| e.to_string())?;

        if !output.success() {
            return Err(describe_failure(output.code, &output.stderr, &output.stdout));
        }
        // Exit zero alone is not enough; the tool may have done nothing
        if !self.platform.is_non_empty_dir(self.destination).await {
            return Err(AcquisitionError::EmptyTree(self.destination.to_path_buf()).to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl Strategy<PathBuf> for ShallowClone<'_> {
    fn name(&self) -> String {
        "shallow-clone".to_string()
    }

    async fn attempt(&self) -> Result<PathBuf, String> {
        let mut diagnostics = Vec::new();

        for program in self.forms() {
            let form = program.display().to_string();
            match self.clone_with(program).await {
                Ok(()) => return Ok(self.destination.to_path_buf()),
                Err(diagnostic) => {
                    self.progress
                        .info(format!("Clone with {form} failed: {diagnostic}"))
                        .await;
                    diagnostics.push(format!("{form}: {diagnostic}"));
                    // A failed clone may leave a partial tree behind
                    self.platform.force_remove(self.destination).await;
                }
            }
        }

        Err(diagnostics.join("; "))
    }
}

/// Download and extract a `.tar.gz` snapshot.
pub struct ArchiveDownload<'a> {
    platform: &'a dyn PlatformOps,
    client: &'a reqwest::Client,
    url: &'a str,
    work_dir: &'a Path,
    archive_root: &'a str,
    progress: &'a ProgressChannel,
}

impl<'a> ArchiveDownload<'a> {
    pub fn new(
        platform: &'a dyn PlatformOps,
        client: &'a reqwest::Client,
        url: &'a str,
        work_dir: &'a Path,
        archive_root: &'a str,
        progress: &'a ProgressChannel,
    ) -> Self {
        Self {
            platform,
            client,
            url,
            work_dir,
            archive_root,
            progress,
        }
    }

    async fn download_and_extract(&self) -> Result<PathBuf, AcquisitionError> {
        let response = self.client.get(self.url).send().await?;
        if !response.status().is_success() {
            return Err(AcquisitionError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;
        self.progress
            .info(format!("Downloaded {} bytes, extracting...", bytes.len()))
            .await;

        tokio::fs::create_dir_all(self.work_dir)
            .await
            .map_err(|source| AcquisitionError::Io {
                path: self.work_dir.to_path_buf(),
                source,
            })?;

        // Removed on drop, whether or not extraction succeeds
        let mut archive_file =
            tempfile::NamedTempFile::new_in(self.work_dir).map_err(|source| {
                AcquisitionError::Io {
                    path: self.work_dir.to_path_buf(),
                    source,
                }
            })?;
        archive_file
            .write_all(&bytes)
            .and_then(|_| archive_file.flush())
            .map_err(|source| AcquisitionError::Io {
                path: archive_file.path().to_path_buf(),
                source,
            })?;

        let target = self.work_dir.to_path_buf();
        let archive_path = archive_file.path().to_path_buf();
        tokio::task::spawn_blocking(move || extract_tar_gz(&archive_path, &target))
            .await
            .map_err(|e| AcquisitionError::Extract(e.to_string()))??;
        drop(archive_file);

        let root = self.work_dir.join(self.archive_root);
        if !self.platform.is_non_empty_dir(&root).await {
            return Err(AcquisitionError::EmptyTree(root));
        }
        Ok(root)
    }
}

#[async_trait]
impl Strategy<PathBuf> for ArchiveDownload<'_> {
    fn name(&self) -> String {
        "archive-download".to_string()
    }

    async fn attempt(&self) -> Result<PathBuf, String> {
        self.progress
            .info(format!("Downloading archive from {}...", self.url))
            .await;
        self.download_and_extract().await.map_err(|e| e.to_string())
    }
}

/// Unpack a gzip-compressed tarball into `target`.
pub fn extract_tar_gz(archive: &Path, target: &Path) -> Result<(), AcquisitionError> {
    let file = std::fs::File::open(archive).map_err(|source| AcquisitionError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tarball = tar::Archive::new(decoder);
    tarball
        .unpack(target)
        .map_err(|e| AcquisitionError::Extract(e.to_string()))
}

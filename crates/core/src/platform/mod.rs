//! Platform operations.
//!
//! Every OS-specific mechanic the pipeline needs lives behind the
//! [`PlatformOps`] trait: running a program to completion, spawning a
//! long-lived process, resolving tools on `PATH`, and forced recursive
//! deletion. One implementation exists per OS family and is selected once at
//! startup by [`native`]; all other components depend only on the trait.
//!
//! Programs are always described by an explicit [`Invocation`] (argument
//! vector, working directory, environment map). Nothing is interpolated into
//! shell strings except where a shell is the point, see [`OsFamily::shell`].

pub mod error;
pub mod mock;
pub mod unix;
pub mod windows;

pub use error::PlatformError;

use async_trait::async_trait;
use rr_protocol::config_models::LaunchMode;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// A program invocation: argument vector, working directory and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables added to the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Program file name without directory or extension (`git`, `pip`).
    pub fn program_name(&self) -> String {
        self.program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Human-readable command line for narration. Not meant to be executed.
    pub fn display(&self) -> String {
        self.argv()
            .iter()
            .map(|part| {
                if part.contains(' ') {
                    format!("\"{part}\"")
                } else {
                    part.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the tokio command this invocation describes.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&self.env);
        cmd.stdin(Stdio::null());
        cmd
    }
}

/// Captured result of a program run to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A readable output stream of a spawned process.
pub type ChildStream = Pin<Box<dyn AsyncRead + Send>>;

/// A freshly spawned long-lived process.
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub stdout: Option<ChildStream>,
    pub stderr: Option<ChildStream>,
    /// The OS handle, when there is a real child behind this process.
    pub child: Option<Child>,
}

impl SpawnedProcess {
    pub(crate) fn from_child(mut child: Child) -> Self {
        let stdout = child
            .stdout
            .take()
            .map(|s| Box::pin(s) as ChildStream);
        let stderr = child
            .stderr
            .take()
            .map(|s| Box::pin(s) as ChildStream);
        Self {
            pid: child.id(),
            stdout,
            stderr,
            child: Some(child),
        }
    }
}

/// Operating-system family, carrying the conventions that differ between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Unix,
    Windows,
}

impl OsFamily {
    /// Family of the running host.
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else {
            OsFamily::Unix
        }
    }

    /// Directory holding executables inside an isolated Python environment.
    pub fn env_bin_dir(&self, env_root: &Path) -> PathBuf {
        match self {
            OsFamily::Unix => env_root.join("bin"),
            OsFamily::Windows => env_root.join("Scripts"),
        }
    }

    /// Path of a tool inside an isolated Python environment.
    pub fn env_executable(&self, env_root: &Path, tool: &str) -> PathBuf {
        let dir = self.env_bin_dir(env_root);
        match self {
            OsFamily::Unix => dir.join(tool),
            OsFamily::Windows => dir.join(format!("{tool}.exe")),
        }
    }

    /// Ambient Python interpreter name.
    pub fn system_python(&self) -> &'static str {
        match self {
            OsFamily::Unix => "python3",
            OsFamily::Windows => "python",
        }
    }

    /// Ambient pip name.
    pub fn system_pip(&self) -> &'static str {
        match self {
            OsFamily::Unix => "pip3",
            OsFamily::Windows => "pip",
        }
    }

    /// npm entry point. On Windows npm is a batch shim.
    pub fn npm(&self) -> &'static str {
        match self {
            OsFamily::Unix => "npm",
            OsFamily::Windows => "npm.cmd",
        }
    }

    /// Run a command line through the system shell.
    pub fn shell(&self, command_line: &str) -> Invocation {
        match self {
            OsFamily::Unix => Invocation::new("sh").args(["-c", command_line]),
            OsFamily::Windows => Invocation::new("cmd").args(["/C", command_line]),
        }
    }

    /// File extension of generated launcher scripts.
    pub fn script_extension(&self) -> &'static str {
        match self {
            OsFamily::Unix => "sh",
            OsFamily::Windows => "bat",
        }
    }
}

/// OS-specific mechanics used by every pipeline component.
#[async_trait]
pub trait PlatformOps: Send + Sync {
    fn family(&self) -> OsFamily;

    /// Run a program to completion, capturing its output.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PlatformError>;

    /// Spawn a long-lived process. In [`LaunchMode::Attached`] the output
    /// streams are piped; in [`LaunchMode::Detached`] they are discarded and
    /// the process is detached from the orchestrator.
    fn spawn(&self, invocation: &Invocation, mode: LaunchMode)
        -> Result<SpawnedProcess, PlatformError>;

    /// Delete a path recursively. Errors are swallowed; returns whether the
    /// path is gone afterwards.
    async fn force_remove(&self, path: &Path) -> bool;

    /// Resolve a tool on `PATH`.
    fn resolve_tool(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    /// Whether `path` is a directory with at least one entry.
    async fn is_non_empty_dir(&self, path: &Path) -> bool {
        match tokio::fs::read_dir(path).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }
}

/// Select the implementation for the running host.
pub fn native() -> Arc<dyn PlatformOps> {
    match OsFamily::current() {
        OsFamily::Unix => Arc::new(unix::UnixPlatform),
        OsFamily::Windows => Arc::new(windows::WindowsPlatform),
    }
}

/// Run an invocation to completion with piped output.
pub(crate) async fn run_captured(invocation: &Invocation) -> Result<CommandOutput, PlatformError> {
    let mut cmd = invocation.to_command();
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let output = cmd.output().await.map_err(|source| PlatformError::Spawn {
        command: invocation.display(),
        source,
    })?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Remove a path with the standard library, ignoring errors.
pub(crate) async fn remove_quietly(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::debug!("Could not remove {}: {}", path.display(), e);
    }
}

//! Scripted platform for tests.
//!
//! `MockPlatform` answers program invocations from a rule table instead of
//! starting real processes. Rules match on the program's file name and,
//! optionally, on an argument; the most recently registered matching rule
//! wins. Handlers may touch the filesystem to simulate side effects such as
//! a clone populating its destination.
//!
//! # Example
//!
//! ```rust
//! use rr_core::platform::mock::{MockPlatform, MockResponse};
//! use rr_core::platform::{Invocation, PlatformOps};
//!
//! # async fn example() {
//! let mock = MockPlatform::new();
//! mock.on("git", MockResponse::ok());
//!
//! let output = mock.run(&Invocation::new("git").arg("--version")).await.unwrap();
//! assert!(output.success());
//! assert!(mock.ran("git"));
//! # }
//! ```

use super::{CommandOutput, Invocation, OsFamily, PlatformError, PlatformOps, SpawnedProcess};
use async_trait::async_trait;
use rr_protocol::config_models::LaunchMode;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Scripted answer to a run-to-completion invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The program cannot be started.
    Missing,
}

impl MockResponse {
    pub fn ok() -> Self {
        Self::ok_with("")
    }

    pub fn ok_with(stdout: &str) -> Self {
        Self::Exit {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

type Handler = Arc<dyn Fn(&Invocation) -> MockResponse + Send + Sync>;

struct RunRule {
    program: String,
    with_arg: Option<String>,
    handler: Handler,
}

#[derive(Clone)]
struct SpawnRule {
    program: String,
    stdout: Vec<String>,
    stderr: Vec<String>,
    fail: bool,
}

/// In-memory [`PlatformOps`] implementation driven by rules.
pub struct MockPlatform {
    family: OsFamily,
    run_rules: Mutex<Vec<RunRule>>,
    spawn_rules: Mutex<Vec<SpawnRule>>,
    tools: Mutex<HashMap<String, PathBuf>>,
    refused: Mutex<HashSet<PathBuf>>,
    hidden: Mutex<HashSet<PathBuf>>,
    runs: Mutex<Vec<Invocation>>,
    spawns: Mutex<Vec<Invocation>>,
    next_pid: Mutex<u32>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::with_family(OsFamily::Unix)
    }

    pub fn with_family(family: OsFamily) -> Self {
        Self {
            family,
            run_rules: Mutex::new(Vec::new()),
            spawn_rules: Mutex::new(Vec::new()),
            tools: Mutex::new(HashMap::new()),
            refused: Mutex::new(HashSet::new()),
            hidden: Mutex::new(HashSet::new()),
            runs: Mutex::new(Vec::new()),
            spawns: Mutex::new(Vec::new()),
            next_pid: Mutex::new(40_000),
        }
    }

    /// Answer every run of `program` with `response`.
    pub fn on(&self, program: &str, response: MockResponse) -> &Self {
        self.push_rule(program, None, Arc::new(move |_: &Invocation| response.clone()))
    }

    /// Answer runs of `program` whose arguments include `arg`.
    pub fn on_arg(&self, program: &str, arg: &str, response: MockResponse) -> &Self {
        self.push_rule(program, Some(arg), Arc::new(move |_: &Invocation| response.clone()))
    }

    /// Answer runs of `program` (optionally filtered by `arg`) with a handler
    /// that may also simulate side effects.
    pub fn on_run<F>(&self, program: &str, arg: Option<&str>, handler: F) -> &Self
    where
        F: Fn(&Invocation) -> MockResponse + Send + Sync + 'static,
    {
        self.push_rule(program, arg, Arc::new(handler))
    }

    fn push_rule(&self, program: &str, arg: Option<&str>, handler: Handler) -> &Self {
        lock(&self.run_rules).push(RunRule {
            program: program.to_string(),
            with_arg: arg.map(str::to_string),
            handler,
        });
        self
    }

    /// Spawns of `program` produce the given output lines and then end.
    pub fn on_spawn(&self, program: &str, stdout: &[&str], stderr: &[&str]) -> &Self {
        lock(&self.spawn_rules).push(SpawnRule {
            program: program.to_string(),
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
            fail: false,
        });
        self
    }

    /// Spawns of `program` fail to start.
    pub fn fail_spawn(&self, program: &str) -> &Self {
        lock(&self.spawn_rules).push(SpawnRule {
            program: program.to_string(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            fail: true,
        });
        self
    }

    /// Make `name` resolvable on the simulated `PATH`.
    pub fn tool(&self, name: &str, path: impl Into<PathBuf>) -> &Self {
        lock(&self.tools).insert(name.to_string(), path.into());
        self
    }

    /// Make `force_remove` leave `path` in place.
    pub fn refuse_removal(&self, path: impl Into<PathBuf>) -> &Self {
        lock(&self.refused).insert(path.into());
        self
    }

    /// Report `path` and everything below it as absent.
    pub fn hide(&self, path: impl Into<PathBuf>) -> &Self {
        lock(&self.hidden).insert(path.into());
        self
    }

    fn is_hidden(&self, path: &Path) -> bool {
        lock(&self.hidden).iter().any(|hidden| path.starts_with(hidden))
    }

    /// Every run-to-completion invocation, in order.
    pub fn runs(&self) -> Vec<Invocation> {
        lock(&self.runs).clone()
    }

    /// Every spawn invocation, in order.
    pub fn spawns(&self) -> Vec<Invocation> {
        lock(&self.spawns).clone()
    }

    /// Whether `program` was run to completion at least once.
    pub fn ran(&self, program: &str) -> bool {
        lock(&self.runs)
            .iter()
            .any(|inv| matches_program(inv, program))
    }

    /// Number of runs of `program`.
    pub fn run_count(&self, program: &str) -> usize {
        lock(&self.runs)
            .iter()
            .filter(|inv| matches_program(inv, program))
            .count()
    }

    fn find_handler(&self, invocation: &Invocation) -> Option<Handler> {
        lock(&self.run_rules)
            .iter()
            .rev()
            .find(|rule| {
                matches_program(invocation, &rule.program)
                    && rule
                        .with_arg
                        .as_ref()
                        .map_or(true, |arg| invocation.args.contains(arg))
            })
            .map(|rule| Arc::clone(&rule.handler))
    }
}

#[async_trait]
impl PlatformOps for MockPlatform {
    fn family(&self) -> OsFamily {
        self.family
    }

    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PlatformError> {
        lock(&self.runs).push(invocation.clone());

        // Handler runs outside the rule lock so it may register further rules
        let response = match self.find_handler(invocation) {
            Some(handler) => handler(invocation),
            None => MockResponse::Missing,
        };

        match response {
            MockResponse::Exit {
                code,
                stdout,
                stderr,
            } => Ok(CommandOutput {
                code: Some(code),
                stdout,
                stderr,
            }),
            MockResponse::Missing => Err(PlatformError::Unavailable {
                command: invocation.display(),
                reason: "not installed".to_string(),
            }),
        }
    }

    fn spawn(
        &self,
        invocation: &Invocation,
        mode: LaunchMode,
    ) -> Result<SpawnedProcess, PlatformError> {
        lock(&self.spawns).push(invocation.clone());

        let rule = lock(&self.spawn_rules)
            .iter()
            .rev()
            .find(|rule| matches_program(invocation, &rule.program))
            .cloned();

        if rule.as_ref().is_some_and(|r| r.fail) {
            return Err(PlatformError::Unavailable {
                command: invocation.display(),
                reason: "spawn refused".to_string(),
            });
        }

        let pid = {
            let mut next = lock(&self.next_pid);
            *next += 1;
            *next
        };

        let (stdout, stderr) = match (mode, rule) {
            (LaunchMode::Attached, Some(rule)) => (
                Some(stream_of(&rule.stdout)),
                Some(stream_of(&rule.stderr)),
            ),
            (LaunchMode::Attached, None) => (Some(stream_of(&[])), Some(stream_of(&[]))),
            (LaunchMode::Detached, _) => (None, None),
        };

        Ok(SpawnedProcess {
            pid: Some(pid),
            stdout,
            stderr,
            child: None,
        })
    }

    async fn force_remove(&self, path: &Path) -> bool {
        if lock(&self.refused).contains(path) {
            return !self.exists(path).await;
        }
        super::remove_quietly(path).await;
        !self.exists(path).await
    }

    fn resolve_tool(&self, name: &str) -> Option<PathBuf> {
        lock(&self.tools).get(name).cloned()
    }

    async fn exists(&self, path: &Path) -> bool {
        !self.is_hidden(path) && tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        if self.is_hidden(path) {
            return false;
        }
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn is_non_empty_dir(&self, path: &Path) -> bool {
        if self.is_hidden(path) {
            return false;
        }
        match tokio::fs::read_dir(path).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }
}

fn matches_program(invocation: &Invocation, program: &str) -> bool {
    invocation.program_name() == program || invocation.program == Path::new(program)
}

fn stream_of(lines: &[String]) -> super::ChildStream {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Box::pin(Cursor::new(text.into_bytes()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

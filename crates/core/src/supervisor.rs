//! Process supervision.
//!
//! The supervisor starts a tier's long-running server, relays its output to
//! the observer, and polls its root URL until it answers or the readiness
//! budget runs out. It is the only owner of the subprocess handles.
//!
//! Started processes are never killed when a run ends or the observer goes
//! away; they are meant to outlive the pipeline. [`ProcessSupervisor::terminate`]
//! exists for explicit shutdown. Each child is awaited by a reaper task, so an
//! exited tier leaves neither a zombie nor a stale handle behind.

use crate::platform::{ChildStream, Invocation, PlatformError, PlatformOps};
use crate::progress::ProgressChannel;
use async_trait::async_trait;
use rr_protocol::config_models::{BackendConfig, FrontendConfig, LaunchMode};
use rr_protocol::ipc::ProgressEvent;
use rr_protocol::process_models::{
    ManagedProcess, OutputStream, Readiness, ReadinessOutcome, RuntimeEnvironment, Tier,
};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

/// Answers whether a URL is being served.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// HTTP status returned by `url`, or why no response was received.
    async fn probe(&self, url: &str) -> Result<u16, String>;
}

/// Probe backed by an HTTP GET.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<u16, String> {
        self.client
            .get(url)
            .send()
            .await
            .map(|response| response.status().as_u16())
            .map_err(|e| e.to_string())
    }
}

/// Probe answering from a script, for tests.
///
/// Answers are consumed in order; once exhausted the last answer repeats.
pub struct ScriptedProbe {
    answers: std::sync::Mutex<VecDeque<Result<u16, String>>>,
    last: std::sync::Mutex<Result<u16, String>>,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn new(answers: Vec<Result<u16, String>>) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.into()),
            last: std::sync::Mutex::new(Err("connection refused".to_string())),
            calls: AtomicU32::new(0),
        }
    }

    /// Refuses `failures` times, then answers 200.
    pub fn ready_after(failures: usize) -> Self {
        let mut answers: Vec<Result<u16, String>> =
            vec![Err("connection refused".to_string()); failures];
        answers.push(Ok(200));
        Self::new(answers)
    }

    /// Never answers.
    pub fn never() -> Self {
        Self::new(Vec::new())
    }

    /// Number of probes received.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn probe(&self, _url: &str) -> Result<u16, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .answers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(answer) = next {
            *last = answer;
        }
        last.clone()
    }
}

/// `python -m uvicorn <app> --reload --host <host> --port <port>`.
pub fn backend_invocation(environment: &RuntimeEnvironment, config: &BackendConfig) -> Invocation {
    Invocation::new(&environment.interpreter)
        .args(["-m", "uvicorn", config.app.as_str(), "--reload"])
        .args(["--host", config.host.as_str()])
        .args(["--port".to_string(), config.port.to_string()])
        .current_dir(&environment.tier_dir)
}

/// `npm start` with `PORT` set.
pub fn frontend_invocation(environment: &RuntimeEnvironment, config: &FrontendConfig) -> Invocation {
    Invocation::new(&environment.package_manager)
        .arg("start")
        .current_dir(&environment.tier_dir)
        .env("PORT", config.port.to_string())
        .env("BROWSER", "none")
}

/// Owner of every tier process started by the pipeline.
pub struct ProcessSupervisor {
    platform: Arc<dyn PlatformOps>,
    probe: Arc<dyn ReadinessProbe>,
    mode: LaunchMode,
    children: Arc<Mutex<HashMap<Uuid, oneshot::Sender<()>>>>,
}

impl ProcessSupervisor {
    pub fn new(
        platform: Arc<dyn PlatformOps>,
        probe: Arc<dyn ReadinessProbe>,
        mode: LaunchMode,
    ) -> Self {
        Self {
            platform,
            probe,
            mode,
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a tier's server.
    ///
    /// In attached mode two relay tasks forward every non-empty output line
    /// to `progress`; they end on their own when the streams close and are
    /// never awaited.
    pub async fn start(
        &self,
        tier: Tier,
        invocation: Invocation,
        progress: &ProgressChannel,
    ) -> Result<ManagedProcess, PlatformError> {
        let mut spawned = self.platform.spawn(&invocation, self.mode)?;
        let id = Uuid::new_v4();
        tracing::info!(
            tier = tier.as_str(),
            pid = ?spawned.pid,
            "Started {}",
            invocation.display()
        );

        if let Some(stdout) = spawned.stdout.take() {
            relay(stdout, tier, OutputStream::Stdout, progress.clone());
        }
        if let Some(stderr) = spawned.stderr.take() {
            relay(stderr, tier, OutputStream::Stderr, progress.clone());
        }
        if let Some(child) = spawned.child.take() {
            let (kill_tx, kill_rx) = oneshot::channel();
            self.children.lock().await.insert(id, kill_tx);
            tokio::spawn(reap(id, tier, child, kill_rx, Arc::clone(&self.children)));
        }

        Ok(ManagedProcess {
            id,
            tier,
            command: invocation.argv(),
            working_dir: invocation
                .cwd
                .clone()
                .unwrap_or_else(|| std::path::PathBuf::from(".")),
            pid: spawned.pid,
            readiness: Readiness::Starting,
            started_at: chrono::Utc::now(),
        })
    }

    /// Poll `url` until it answers with a non-error status or `max_wait`
    /// elapses.
    ///
    /// Polling stops at the first success and never runs longer than
    /// `max_wait` plus one `poll_interval`. A timeout is reported, not
    /// raised: the caller continues with degraded confidence.
    pub async fn await_ready(
        &self,
        process: &mut ManagedProcess,
        url: &str,
        max_wait: Duration,
        poll_interval: Duration,
        progress: &ProgressChannel,
    ) -> ReadinessOutcome {
        let label = process.tier.label();
        let deadline = Instant::now() + max_wait;
        let mut attempts = 0u32;

        progress
            .info(format!("Waiting for {} server to initialize...", process.tier))
            .await;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            progress
                .info(format!(
                    "{label} initialization: {} seconds remaining...",
                    ceil_secs(remaining)
                ))
                .await;

            attempts += 1;
            match tokio::time::timeout(remaining, self.probe.probe(url)).await {
                Ok(Ok(status)) if status < 400 => {
                    process.readiness = Readiness::Ready;
                    progress
                        .emit(ProgressEvent::Ready {
                            tier: process.tier,
                            url: url.to_string(),
                        })
                        .await;
                    return ReadinessOutcome::Ready { attempts };
                }
                Ok(Ok(status)) => {
                    progress
                        .info(format!("{label} not responding yet (HTTP {status})..."))
                        .await;
                }
                Ok(Err(reason)) => {
                    tracing::debug!("{} probe failed: {}", label, reason);
                    progress.info(format!("{label} not responding yet...")).await;
                }
                Err(_) => {
                    progress.info(format!("{label} not responding yet...")).await;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }

        process.readiness = Readiness::TimedOut;
        tracing::warn!(
            tier = process.tier.as_str(),
            attempts,
            "Readiness budget of {:?} exhausted",
            max_wait
        );
        ReadinessOutcome::TimedOut { attempts }
    }

    /// Kill a process started by this supervisor. Returns whether it was
    /// still running.
    pub async fn terminate(&self, id: Uuid) -> bool {
        let Some(kill) = self.children.lock().await.remove(&id) else {
            return false;
        };
        // A closed receiver means the child exited in the meantime
        kill.send(()).is_ok()
    }

    /// Number of processes still running.
    pub async fn tracked(&self) -> usize {
        self.children.lock().await.len()
    }
}

/// Wait for `child` to exit, or kill it on request, then drop its handle.
async fn reap(
    id: Uuid,
    tier: Tier,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    children: Arc<Mutex<HashMap<Uuid, oneshot::Sender<()>>>>,
) {
    let killed = tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => {
                    tracing::info!(tier = tier.as_str(), %id, "Process exited with {}", status)
                }
                Err(e) => tracing::warn!(tier = tier.as_str(), %id, "Failed to wait: {}", e),
            }
            false
        }
        Ok(()) = kill => true,
    };

    if killed {
        if let Err(e) = child.kill().await {
            tracing::warn!("Failed to kill process {}: {}", id, e);
        }
    }
    children.lock().await.remove(&id);
}

/// Forward every non-empty line of `stream` as a progress event.
fn relay(
    stream: ChildStream,
    tier: Tier,
    which: OutputStream,
    progress: ProgressChannel,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = output_lines(stream);
        while let Some(line) = lines.next().await {
            progress
                .emit(ProgressEvent::ProcessOutput {
                    source: tier.to_string(),
                    stream: which,
                    line,
                })
                .await;
        }
        tracing::debug!("{} {:?} closed", tier, which);
    })
}

/// Non-empty lines of a child stream, trailing whitespace trimmed.
fn output_lines(stream: ChildStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    Box::pin(async_stream::stream! {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim_end();
                    if !line.trim().is_empty() {
                        yield line.to_string();
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Output stream error: {}", e);
                    break;
                }
            }
        }
    })
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

//! Ordered fallback ladders.
//!
//! A ladder tries interchangeable strategies in order and stops at the first
//! one that succeeds. Every failed rung is recorded with its diagnostic so
//! callers can narrate what was tried.

use crate::platform::{Invocation, PlatformOps};
use async_trait::async_trait;

/// One rung of a fallback ladder.
#[async_trait]
pub trait Strategy<T>: Send + Sync {
    /// Short name used in narration and diagnostics.
    fn name(&self) -> String;

    /// Try to produce a value. The error is a human-readable diagnostic.
    async fn attempt(&self) -> Result<T, String>;
}

/// Record of one rung that was tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: String,
    pub success: bool,
    pub diagnostic: Option<String>,
}

/// Result of walking a ladder.
#[derive(Debug)]
pub struct LadderOutcome<T> {
    /// Value produced by the first successful rung, if any.
    pub value: Option<T>,
    pub attempts: Vec<Attempt>,
}

impl<T> LadderOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }

    /// Name of the rung that succeeded.
    pub fn winner(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|a| a.success)
            .map(|a| a.strategy.as_str())
    }

    /// Diagnostics of failed rungs, joined for display.
    pub fn failure_summary(&self) -> String {
        self.attempts
            .iter()
            .filter(|a| !a.success)
            .map(|a| {
                format!(
                    "{}: {}",
                    a.strategy,
                    a.diagnostic.as_deref().unwrap_or("failed")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Ordered list of strategies producing a `T`.
pub struct FallbackLadder<'a, T> {
    rungs: Vec<Box<dyn Strategy<T> + 'a>>,
}

impl<'a, T: Send> Default for FallbackLadder<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Send> FallbackLadder<'a, T> {
    pub fn new() -> Self {
        Self { rungs: Vec::new() }
    }

    /// Append a rung.
    pub fn then(mut self, strategy: impl Strategy<T> + 'a) -> Self {
        self.rungs.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Try each rung in order until one succeeds.
    pub async fn run(&self) -> LadderOutcome<T> {
        let mut attempts = Vec::with_capacity(self.rungs.len());

        for rung in &self.rungs {
            let name = rung.name();
            match rung.attempt().await {
                Ok(value) => {
                    tracing::debug!("Strategy '{}' succeeded", name);
                    attempts.push(Attempt {
                        strategy: name,
                        success: true,
                        diagnostic: None,
                    });
                    return LadderOutcome {
                        value: Some(value),
                        attempts,
                    };
                }
                Err(diagnostic) => {
                    tracing::info!("Strategy '{}' failed: {}", name, diagnostic);
                    attempts.push(Attempt {
                        strategy: name,
                        success: false,
                        diagnostic: Some(diagnostic),
                    });
                }
            }
        }

        LadderOutcome {
            value: None,
            attempts,
        }
    }
}

/// A rung that runs one command and succeeds on exit status zero.
pub struct CommandStrategy<'a> {
    name: String,
    platform: &'a dyn PlatformOps,
    invocation: Invocation,
}

impl<'a> CommandStrategy<'a> {
    pub fn new(name: impl Into<String>, platform: &'a dyn PlatformOps, invocation: Invocation) -> Self {
        Self {
            name: name.into(),
            platform,
            invocation,
        }
    }
}

#[async_trait]
impl Strategy<()> for CommandStrategy<'_> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn attempt(&self) -> Result<(), String> {
        tracing::debug!("Running: {}", self.invocation.display());
        let output = self
            .platform
            .run(&self.invocation)
            .await
            .map_err(|e| e.to_string())?;

        if output.success() {
            Ok(())
        } else {
            Err(describe_failure(output.code, &output.stderr, &output.stdout))
        }
    }
}

/// One-line description of a failed command: exit code plus the last
/// non-blank line of stderr, or of stdout when stderr is silent.
pub fn describe_failure(code: Option<i32>, stderr: &str, stdout: &str) -> String {
    let status = match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    };
    let last_line = last_meaningful_line(stderr).or_else(|| last_meaningful_line(stdout));
    match last_line {
        Some(line) => format!("{status}: {line}"),
        None => status,
    }
}

fn last_meaningful_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

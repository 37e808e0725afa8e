//! Unix-family platform operations.

use super::{
    remove_quietly, run_captured, CommandOutput, Invocation, OsFamily, PlatformError,
    PlatformOps, SpawnedProcess,
};
use async_trait::async_trait;
use rr_protocol::config_models::LaunchMode;
use std::path::Path;
use std::process::Stdio;

/// Platform operations for Linux, macOS and other Unix hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPlatform;

#[async_trait]
impl PlatformOps for UnixPlatform {
    fn family(&self) -> OsFamily {
        OsFamily::Unix
    }

    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, PlatformError> {
        run_captured(invocation).await
    }

    fn spawn(
        &self,
        invocation: &Invocation,
        mode: LaunchMode,
    ) -> Result<SpawnedProcess, PlatformError> {
        let mut cmd = invocation.to_command();
        match mode {
            LaunchMode::Attached => {
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::piped());
            }
            LaunchMode::Detached => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
        }
        // Own process group so the tier survives signals aimed at the orchestrator
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| PlatformError::Spawn {
            command: invocation.display(),
            source,
        })?;
        Ok(SpawnedProcess::from_child(child))
    }

    async fn force_remove(&self, path: &Path) -> bool {
        if !self.exists(path).await {
            return true;
        }
        remove_quietly(path).await;
        if !self.exists(path).await {
            return true;
        }

        let fallback = Invocation::new("rm")
            .arg("-rf")
            .arg(path.to_string_lossy());
        match run_captured(&fallback).await {
            Ok(output) if !output.success() => {
                tracing::debug!("rm -rf {} failed: {}", path.display(), output.stderr.trim());
            }
            Err(e) => tracing::debug!("{}", e),
            Ok(_) => {}
        }
        !self.exists(path).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_run_captures_output_and_exit_code() {
        let platform = UnixPlatform;
        let output = platform
            .run(&OsFamily::Unix.shell("echo hello; echo oops >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_run_missing_program_is_spawn_error() {
        let result = UnixPlatform
            .run(&Invocation::new("definitely-not-a-real-program-xyz"))
            .await;
        assert!(matches!(result, Err(PlatformError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_run_passes_cwd_and_env() {
        let temp = tempfile::tempdir().unwrap();
        let inv = OsFamily::Unix
            .shell("pwd; echo $RR_TEST_VALUE")
            .current_dir(temp.path())
            .env("RR_TEST_VALUE", "42");

        let output = UnixPlatform.run(&inv).await.unwrap();
        let lines: Vec<&str> = output.stdout.lines().collect();
        let canonical = temp.path().canonicalize().unwrap();
        assert_eq!(Path::new(lines[0]).canonicalize().unwrap(), canonical);
        assert_eq!(lines[1], "42");
    }

    #[tokio::test]
    async fn test_spawn_attached_pipes_output() {
        let mut spawned = UnixPlatform
            .spawn(&OsFamily::Unix.shell("echo relayed"), LaunchMode::Attached)
            .unwrap();

        assert!(spawned.pid.is_some());
        let mut stdout = spawned.stdout.take().unwrap();
        let mut text = String::new();
        stdout.read_to_string(&mut text).await.unwrap();
        assert_eq!(text.trim(), "relayed");
        spawned.child.unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_detached_has_no_streams() {
        let spawned = UnixPlatform
            .spawn(&Invocation::new("true"), LaunchMode::Detached)
            .unwrap();
        assert!(spawned.stdout.is_none());
        assert!(spawned.stderr.is_none());
        spawned.child.unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_force_remove() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("tree");
        std::fs::create_dir_all(target.join("nested/deeper")).unwrap();
        std::fs::write(target.join("nested/file.txt"), "x").unwrap();

        assert!(UnixPlatform.force_remove(&target).await);
        assert!(!target.exists());

        // Absent paths count as removed
        assert!(UnixPlatform.force_remove(&target).await);
    }
}

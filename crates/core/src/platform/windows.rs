//! Windows platform operations.

use super::{
    remove_quietly, run_captured, CommandOutput, Invocation, OsFamily, PlatformError,
    PlatformOps, SpawnedProcess,
};
use async_trait::async_trait;
use rr_protocol::config_models::LaunchMode;
use std::path::Path;
use std::process::Stdio;

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Platform operations for Windows hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsPlatform;

#[async_trait]
impl PlatformOps for WindowsPlatform {
    fn family(&self) -> OsFamily {
        OsFamily::Windows
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
                #[cfg(windows)]
                cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
            }
            LaunchMode::Detached => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
                #[cfg(windows)]
                cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
            }
        }

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

        // Read-only files inside .git make remove_dir_all fail on Windows
        let fallback = Invocation::new("cmd")
            .args(["/C", "rd", "/s", "/q"])
            .arg(path.to_string_lossy());
        match run_captured(&fallback).await {
            Ok(output) if !output.success() => {
                tracing::debug!("rd /s /q {} failed: {}", path.display(), output.stderr.trim());
            }
            Err(e) => tracing::debug!("{}", e),
            Ok(_) => {}
        }
        !self.exists(path).await
    }
}

//! Integration tests for PipelineEngine.
//!
//! These tests verify that the PipelineEngine correctly:
//! - Executes the ten stages sequentially
//! - Aborts only when a required directory or the source tree is missing
//! - Degrades and continues on environment, install and readiness failures
//! - Updates the shared status at the right moments

mod common;

use common::*;
use rr_core::platform::mock::MockResponse;
use rr_core::progress::ProgressChannel;
use rr_core::state::SharedStatus;
use rr_core::supervisor::ScriptedProbe;
use rr_protocol::ipc::StatusSnapshot;
use rr_protocol::pipeline_models::{RunOutcome, Stage, StageResult};
use rr_protocol::process_models::{IsolationStatus, Readiness, Tier};
use std::sync::Arc;

#[tokio::test]
async fn test_full_run_provisions_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let platform = Arc::new(provisioning_platform(CHATBOT_LAYOUT));
    platform.on_spawn("python", &["Uvicorn running on http://0.0.0.0:8000"], &[]);
    let engine = test_engine(config.clone(), Arc::clone(&platform), ScriptedProbe::ready_after(0));

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_eq!(run.outcome, Some(RunOutcome::Succeeded));
    assert_stages_in_order(&run, 10);
    assert_eq!(
        status.snapshot(),
        StatusSnapshot {
            backend_running: true,
            frontend_running: true
        }
    );

    let repo = config.repo_path();
    assert_eq!(run.source_tree.as_deref(), Some(repo.as_path()));
    assert_eq!(run.base_dir, Some(repo.join("chatbot")));
    assert_eq!(run.backend_dir, Some(repo.join("chatbot/backend")));
    assert_eq!(
        run.backend_env.as_ref().unwrap().isolation,
        IsolationStatus::Isolated
    );
    assert_eq!(run.processes.len(), 2);
    assert!(run.processes.iter().all(|p| p.readiness == Readiness::Ready));
    assert!(repo.join("chatbot/backend/run_backend.sh").exists());
    assert!(repo.join("chatbot/frontend/run_frontend.sh").exists());

    assert_lines_in_order(
        &lines,
        &[
            "Starting repository clone and setup...",
            "Note: Main application runs on ports 3002/8002",
            "Note: Cloned repository will run on ports 3000/8000",
            "STEP 1: Preparing for clean installation...",
            "✅ STEP 1 COMPLETE: Environment prepared",
            "STEP 2: Acquiring repository source...",
            "✅ STEP 2 COMPLETE: Repository downloaded successfully",
            "Found chatbot directory",
            "✅ STEP 4 COMPLETE: Backend directory located",
            "✅ Backend server is running and responding on http://localhost:8000",
            "✅ STEP 7 COMPLETE: Backend is now running",
            "✅ Frontend server is running and responding on http://localhost:3000",
            "✅ STEP 9 COMPLETE: Frontend server is running",
            "✅ Backend API: http://localhost:8000",
            "✅ Frontend UI: http://localhost:3000",
            "🎉 SETUP COMPLETE! Both services are now running.",
        ],
    );
    assert_has_line(
        &lines,
        "Process output (backend): Uvicorn running on http://0.0.0.0:8000",
    );
}

#[tokio::test]
async fn test_missing_backend_is_fatal_at_stage_four() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(provisioning_platform(NO_BACKEND_LAYOUT));
    let engine = test_engine(
        test_config(dir.path()),
        Arc::clone(&platform),
        ScriptedProbe::ready_after(0),
    );

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_aborted_at(&run, Stage::LocateBackend);
    assert_stages_in_order(&run, 4);
    assert_eq!(status.snapshot(), StatusSnapshot::default());
    assert!(platform.spawns().is_empty());
    assert!(!platform.ran("python3"));
    assert_has_line(&lines, "❌ ERROR: Backend directory not found in");
    assert_no_line(&lines, "SETUP COMPLETE");
}

#[tokio::test]
async fn test_base_directory_lookup_goes_through_platform() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let platform = Arc::new(provisioning_platform(CHATBOT_LAYOUT));
    platform.hide(config.repo_path().join("chatbot"));
    let engine = test_engine(
        config.clone(),
        Arc::clone(&platform),
        ScriptedProbe::ready_after(0),
    );

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_eq!(run.base_dir, Some(config.repo_path()));
    assert_aborted_at(&run, Stage::LocateBackend);
    assert_has_line(&lines, "No chatbot directory found. Using repository root");
}

#[tokio::test]
async fn test_missing_frontend_is_fatal_after_backend_started() {
    const BACKEND_ONLY: &[(&str, &str)] = &[("backend/main.py", "app = None\n")];

    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(provisioning_platform(BACKEND_ONLY));
    let engine = test_engine(
        test_config(dir.path()),
        Arc::clone(&platform),
        ScriptedProbe::ready_after(0),
    );

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_aborted_at(&run, Stage::LocateFrontend);
    assert_has_line(&lines, "No chatbot directory found. Using repository root");
    assert_eq!(
        status.snapshot(),
        StatusSnapshot {
            backend_running: true,
            frontend_running: false
        }
    );
    assert_eq!(platform.spawns().len(), 1);
}

#[tokio::test]
async fn test_readiness_timeout_still_marks_tiers_running() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(provisioning_platform(CHATBOT_LAYOUT));
    let engine = test_engine(
        test_config(dir.path()),
        Arc::clone(&platform),
        ScriptedProbe::never(),
    );

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_eq!(run.outcome, Some(RunOutcome::Succeeded));
    assert_eq!(
        status.snapshot(),
        StatusSnapshot {
            backend_running: true,
            frontend_running: true
        }
    );
    assert!(run
        .processes
        .iter()
        .all(|p| p.readiness == Readiness::TimedOut));

    let warnings = run.result_of(Stage::StartBackend).unwrap().warnings();
    assert_eq!(
        warnings,
        ["Backend did not respond within 1s; assuming it is still starting".to_string()]
    );
    assert_has_line(&lines, "Backend initialization: 1 seconds remaining...");
    assert_has_line(&lines, "Backend not responding yet...");
    assert_lines_in_order(
        &lines,
        &[
            "⚠️ Backend did not respond within 1s",
            "✅ STEP 7 COMPLETE: Backend is now running",
        ],
    );
}

#[tokio::test]
async fn test_failed_spawn_degrades_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(provisioning_platform(CHATBOT_LAYOUT));
    platform.fail_spawn("python");
    let engine = test_engine(
        test_config(dir.path()),
        Arc::clone(&platform),
        ScriptedProbe::ready_after(0),
    );

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_eq!(run.outcome, Some(RunOutcome::Succeeded));
    assert!(status.snapshot().is_running(Tier::Backend));
    assert_eq!(run.processes.len(), 1);
    assert_eq!(run.processes[0].tier, Tier::Frontend);
    assert_has_line(&lines, "⚠️ Error starting backend");
}

#[tokio::test]
async fn test_environment_failures_degrade_to_system_tools() {
    let dir = tempfile::tempdir().unwrap();
    let platform = provisioning_platform(CHATBOT_LAYOUT);
    platform
        .on_arg("python3", "venv", MockResponse::fail(1, "No module named venv"))
        .on("python3", MockResponse::fail(1, "pip: command failed"))
        .on("pip3", MockResponse::fail(1, "could not resolve host"))
        .on_arg("npm", "install", MockResponse::fail(1, "npm ERR! network"))
        .on("sh", MockResponse::fail(1, "npm ERR! network"));
    let platform = Arc::new(platform);
    let engine = test_engine(
        test_config(dir.path()),
        Arc::clone(&platform),
        ScriptedProbe::ready_after(0),
    );

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_eq!(run.outcome, Some(RunOutcome::Succeeded));
    assert_eq!(
        run.backend_env.as_ref().unwrap().isolation,
        IsolationStatus::FallbackToSystem
    );
    assert_eq!(
        run.frontend_env.as_ref().unwrap().isolation,
        IsolationStatus::FallbackToSystem
    );
    assert!(matches!(
        run.result_of(Stage::BuildBackendEnv),
        Some(StageResult::CompletedWithWarnings(_))
    ));
    assert!(matches!(
        run.result_of(Stage::InstallBackendDeps),
        Some(StageResult::CompletedWithWarnings(_))
    ));
    assert_has_line(&lines, "using system Python");
    assert_has_line(&lines, "⚠️ All dependency install attempts failed");
    assert_has_line(&lines, "⚠️ npm install failed");
    assert!(status.snapshot().is_running(Tier::Frontend));
}

#[tokio::test]
async fn test_cleanup_removes_prior_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    write_tree(&config.repo_path(), &[("stale.txt", "old run")]);
    write_tree(&config.archive_path(), &[("stale.txt", "old archive")]);

    let platform = Arc::new(provisioning_platform(CHATBOT_LAYOUT));
    let engine = test_engine(config.clone(), Arc::clone(&platform), ScriptedProbe::ready_after(0));

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_eq!(run.outcome, Some(RunOutcome::Succeeded));
    assert_eq!(run.destination, Some(config.repo_path()));
    assert!(!config.repo_path().join("stale.txt").exists());
    assert!(!config.archive_path().exists());
    assert_has_line(&lines, "Found existing directory. Cleaning");

    // A second run over the first one's leftovers behaves the same
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let again = engine.run(&status, &progress).await;
    drop(progress);
    lines.await.unwrap();
    assert_eq!(again.outcome, Some(RunOutcome::Succeeded));
    assert_eq!(again.destination, Some(config.repo_path()));
}

#[tokio::test]
async fn test_undeletable_destination_is_rotated() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    write_tree(&config.repo_path(), &[("locked.txt", "held open")]);

    let platform = Arc::new(provisioning_platform(CHATBOT_LAYOUT));
    platform.refuse_removal(config.repo_path());
    let engine = test_engine(config.clone(), Arc::clone(&platform), ScriptedProbe::ready_after(0));

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    let run = engine.run(&status, &progress).await;
    drop(progress);
    let lines = lines.await.unwrap();

    assert_eq!(run.outcome, Some(RunOutcome::Succeeded));
    let destination = run.destination.clone().unwrap();
    assert_ne!(destination, config.repo_path());
    assert!(destination
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("aichatbot_"));
    assert_eq!(run.source_tree, Some(destination));
    assert_has_line(&lines, "Using alternative directory");
}

#[tokio::test]
async fn test_disconnect_stops_before_next_stage() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(provisioning_platform(CHATBOT_LAYOUT));
    let engine = test_engine(
        test_config(dir.path()),
        Arc::clone(&platform),
        ScriptedProbe::ready_after(0),
    );

    let status = SharedStatus::new();
    let (progress, rx) = ProgressChannel::new(64);
    let observer = std::sync::Mutex::new(Some(rx));

    // The observer goes away while the clone is running
    platform.on_run("git", Some("clone"), move |invocation| {
        observer.lock().unwrap().take();
        let dest = std::path::PathBuf::from(invocation.args.last().unwrap());
        write_tree(&dest, CHATBOT_LAYOUT);
        MockResponse::ok()
    });

    let run = engine.run(&status, &progress).await;

    assert_eq!(
        run.outcome,
        Some(RunOutcome::Cancelled {
            before: Stage::LocateBase
        })
    );
    assert_stages_in_order(&run, 2);
    assert_eq!(status.snapshot(), StatusSnapshot::default());
    assert!(platform.spawns().is_empty());
}

#[tokio::test]
async fn test_new_run_resets_status() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(provisioning_platform(NO_BACKEND_LAYOUT));
    let engine = test_engine(
        test_config(dir.path()),
        Arc::clone(&platform),
        ScriptedProbe::ready_after(0),
    );

    let status = SharedStatus::new();
    status.set_running(Tier::Backend);
    status.set_running(Tier::Frontend);

    let (progress, rx) = ProgressChannel::new(64);
    let lines = collect_lines(rx);
    engine.run(&status, &progress).await;
    drop(progress);
    lines.await.unwrap();

    assert_eq!(status.snapshot(), StatusSnapshot::default());
}

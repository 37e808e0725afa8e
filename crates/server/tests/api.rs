//! In-process tests for the HTTP router.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rr_core::config::models::AppConfig;
use rr_core::engine::PipelineEngine;
use rr_core::platform::mock::MockPlatform;
use rr_core::progress::ProgressChannel;
use rr_core::state::RunManager;
use rr_core::supervisor::ScriptedProbe;
use rr_protocol::config_models::ProvisionConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

fn manager(root: &std::path::Path) -> RunManager {
    let mut provision = ProvisionConfig::default();
    provision.workspace.work_dir = PathBuf::from("work");
    // Unreachable archive so a run fails fast without network access
    provision.repository.archive_url = "http://127.0.0.1:9/main.tar.gz".to_string();
    let engine = PipelineEngine::new(
        AppConfig::new(root, provision),
        Arc::new(MockPlatform::new()),
        Arc::new(ScriptedProbe::ready_after(0)),
        reqwest::Client::new(),
    );
    RunManager::new(engine)
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_root_message() {
    let dir = tempfile::tempdir().unwrap();
    let app = rr_server::api::create_router(manager(dir.path()));

    let (status, body) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "GitHub Repository Runner API");
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = rr_server::api::create_router(manager(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_starts_false() {
    let dir = tempfile::tempdir().unwrap();
    let app = rr_server::api::create_router(manager(dir.path()));

    let (status, body) = get(app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({ "backend_running": false, "frontend_running": false })
    );
}

#[tokio::test]
async fn test_last_run_not_found_before_any_run() {
    let dir = tempfile::tempdir().unwrap();
    let app = rr_server::api::create_router(manager(dir.path()));

    let (status, body) = get(app, "/runs/last").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No run has finished yet");
}

#[tokio::test]
async fn test_last_run_reports_aborted_run() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());
    let (progress, mut rx) = ProgressChannel::new(16);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    manager.start_run(progress).await.unwrap();
    drain.await.unwrap();

    let app = rr_server::api::create_router(manager);
    let (status, body) = get(app, "/runs/last").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["state"], "aborted");
    assert_eq!(body["outcome"]["stage"], "acquire-source");
    assert_eq!(body["acquisition"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_websocket_route_requires_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let app = rr_server::api::create_router(manager(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ws/run-repo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

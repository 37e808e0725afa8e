//! Test fixtures: configurations, simulated repositories and scripted
//! platforms.

use flate2::write::GzEncoder;
use flate2::Compression;
use rr_core::config::models::AppConfig;
use rr_core::engine::PipelineEngine;
use rr_core::platform::mock::{MockPlatform, MockResponse};
use rr_core::platform::Invocation;
use rr_core::supervisor::ScriptedProbe;
use rr_protocol::config_models::ProvisionConfig;
use rr_protocol::ipc::ProgressEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;

/// Files of a well-formed repository, relative to its root.
pub const CHATBOT_LAYOUT: &[(&str, &str)] = &[
    ("chatbot/backend/main.py", "from fastapi import FastAPI\napp = FastAPI()\n"),
    ("chatbot/backend/requirements.txt", "fastapi\nuvicorn\n"),
    ("chatbot/frontend/package.json", "{\"name\": \"chatbot-frontend\"}\n"),
    ("README.md", "# aichatbot\n"),
];

/// Repository without a backend directory.
pub const NO_BACKEND_LAYOUT: &[(&str, &str)] = &[
    ("chatbot/frontend/package.json", "{\"name\": \"chatbot-frontend\"}\n"),
    ("README.md", "# aichatbot\n"),
];

/// Configuration rooted at `root` with short timings.
pub fn test_config(root: &Path) -> AppConfig {
    let mut provision = ProvisionConfig::default();
    provision.workspace.work_dir = PathBuf::from("work");
    provision.supervisor.poll_interval_ms = 50;
    provision.backend.ready_timeout_secs = 1;
    provision.frontend.ready_timeout_secs = 1;
    AppConfig::new(root, provision)
}

/// Write `layout` under `root`.
pub fn write_tree(root: &Path, layout: &[(&str, &str)]) {
    for (relative, content) in layout {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// Platform where every tool is present and behaves: `git clone` produces
/// `layout`, venv creation produces the environment executables, and npm
/// creates `node_modules`.
pub fn provisioning_platform(layout: &'static [(&'static str, &'static str)]) -> MockPlatform {
    let platform = MockPlatform::new();
    simulate_clone(&platform, layout);
    simulate_toolchain(&platform);
    platform
}

/// `git clone ... <dest>` writes `layout` into `<dest>`.
pub fn simulate_clone(platform: &MockPlatform, layout: &'static [(&'static str, &'static str)]) {
    platform.on_run("git", Some("clone"), move |invocation: &Invocation| {
        let dest = PathBuf::from(invocation.args.last().unwrap());
        write_tree(&dest, layout);
        MockResponse::ok()
    });
}

/// Python and npm succeed with the filesystem effects of the real tools.
pub fn simulate_toolchain(platform: &MockPlatform) {
    platform
        .on_run("python3", Some("venv"), |invocation: &Invocation| {
            let cwd = invocation.cwd.clone().unwrap();
            let env_dir = cwd.join(invocation.args.last().unwrap());
            write_tree(&env_dir, &[("bin/python", ""), ("bin/pip", "")]);
            MockResponse::ok()
        })
        .on("pip", MockResponse::ok())
        .on_run("npm", Some("install"), |invocation: &Invocation| {
            let cwd = invocation.cwd.clone().unwrap();
            std::fs::create_dir_all(cwd.join("node_modules")).unwrap();
            MockResponse::ok()
        });
}

/// Engine over a mock platform and a scripted probe.
pub fn test_engine(config: AppConfig, platform: Arc<MockPlatform>, probe: ScriptedProbe) -> PipelineEngine {
    PipelineEngine::new(config, platform, Arc::new(probe), reqwest::Client::new())
}

/// Collect every rendered line until all senders are gone.
pub fn collect_lines(mut rx: Receiver<ProgressEvent>) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut lines = Vec::new();
        while let Some(event) = rx.recv().await {
            lines.push(event.render());
        }
        lines
    })
}

/// `.tar.gz` holding `layout` under the top-level directory `root`.
pub fn tar_gz(root: &str, layout: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (relative, content) in layout {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{root}/{relative}"), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serve `body` with `status` on a local port. Returns the archive URL.
pub async fn serve_archive(status: u16, body: Vec<u8>) -> String {
    use axum::http::StatusCode;
    use axum::routing::get;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let status = StatusCode::from_u16(status).unwrap();
    let app = axum::Router::new().route(
        "/archive/main.tar.gz",
        get(move || {
            let body = body.clone();
            async move { (status, body) }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/archive/main.tar.gz")
}

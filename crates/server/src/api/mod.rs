//! API Module
//!
//! HTTP and websocket layer of the runner.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod health;
pub mod runs;
pub mod ws;

use axum::{routing::get, Router};
use rr_core::state::RunManager;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: RunManager,
}

/// Create the router with all endpoints.
pub fn create_router(manager: RunManager) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/status", get(runs::status))
        .route("/runs/last", get(runs::last_run))
        .route("/ws/run-repo", get(ws::run_repo))
        .with_state(AppState { manager })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

//! Liveness endpoints.

use axum::{http::StatusCode, response::IntoResponse, Json};

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "GitHub Repository Runner API" }))
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

//! Health check endpoint

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness: 200 with `{"status":"ok"}` while the process is serving
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

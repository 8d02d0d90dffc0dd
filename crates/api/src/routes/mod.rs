//! HTTP routes

pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{error::ApiError, state::AppState, websocket::ws_handler};

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Create the relay router
///
/// `GET /health` is the only plain route. Every other path accepts WebSocket
/// upgrades and answers anything else with a plain-text 404.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health).fallback(not_found))
        .fallback(ws_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

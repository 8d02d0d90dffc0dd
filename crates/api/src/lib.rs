//! Session Relay API Library
//!
//! This crate contains the HTTP + WebSocket server components of the
//! session signaling relay.

pub mod config;
pub mod error;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

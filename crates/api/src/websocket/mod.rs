//! WebSocket signaling relay
//!
//! Lets the participants of a session exchange WebRTC negotiation messages
//! (offer/answer/ICE candidates) and chat text.
//!
//! # Architecture
//!
//! - **Connection**: one live socket bound to a session and a user
//! - **Registry**: live connections keyed by (user, session)
//! - **Router**: fans an envelope out to everyone else in the session
//! - **Chat**: per-session serialized persistence of chat notes
//! - **Handler**: Axum upgrade route and per-connection lifecycle
//! - **Events**: the JSON envelope codec

pub mod chat;
pub mod connection;
pub mod events;
pub mod handler;
pub mod registry;
pub mod router;

pub use chat::ChatJournal;
pub use connection::{Connection, ConnectionState};
pub use events::{DecodeError, MessageType, SignalEnvelope};
pub use handler::ws_handler;
pub use registry::{ConnectionRegistry, RegistryKey};
pub use router::{RouteOutcome, SessionRouter};

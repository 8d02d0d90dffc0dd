//! WebSocket connection management
//!
//! Represents one live WebSocket bound to a single session and user.

use axum::extract::ws::{close_code, CloseFrame, Message};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::registry::RegistryKey;

/// Lifecycle of the underlying socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique ID for this socket, distinguishes reconnects under the same key
    pub id: Uuid,

    pub user_id: String,

    pub session_id: String,

    /// Channel drained by the socket writer task
    sender: mpsc::UnboundedSender<Message>,

    state: AtomicU8,

    /// Set once the close path has run for this connection
    close_started: AtomicBool,
}

impl Connection {
    /// Create a new open connection
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            sender,
            state: AtomicU8::new(ConnectionState::Open as u8),
            close_started: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> RegistryKey {
        RegistryKey::new(&self.user_id, &self.session_id)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue a text frame for this connection
    ///
    /// Returns false without error when the connection is no longer open.
    pub fn send_text(&self, frame: impl Into<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.sender.send(Message::Text(frame.into())).is_err() {
            // Writer task is gone, the socket is unusable
            self.mark_closed();
            tracing::warn!(
                connection_id = %self.id,
                user_id = %self.user_id,
                session_id = %self.session_id,
                "Failed to queue frame (writer closed)"
            );
            return false;
        }
        true
    }

    /// Leave the Open state and claim the close path
    ///
    /// Returns true for exactly one caller per connection.
    pub fn begin_close(&self) -> bool {
        let _ = self.state.compare_exchange(
            ConnectionState::Open as u8,
            ConnectionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        !self.close_started.swap(true, Ordering::AcqRel)
    }

    /// Record that the socket is fully closed
    pub fn mark_closed(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Queue a close frame for the peer, whatever the current state
    pub fn queue_close(&self, code: u16, reason: &'static str) {
        let _ = self.sender.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })));
    }

    /// Close a connection that was replaced by a newer one under the same key
    ///
    /// The displaced socket emits no leave notification.
    pub fn supersede(&self) {
        if self.begin_close() {
            self.queue_close(close_code::NORMAL, "Replaced by a newer connection");
            tracing::info!(
                connection_id = %self.id,
                user_id = %self.user_id,
                session_id = %self.session_id,
                "Connection superseded"
            );
        }
    }
}

//! WebSocket handler for Axum
//!
//! Drives one connection from upgrade to close: registration, join/leave
//! notifications and per-frame dispatch.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::StreamExt, FutureExt, SinkExt};
use serde::Deserialize;
use sessionrelay_shared::StoreError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::error::ApiError;
use crate::state::AppState;

use super::{
    chat::PendingAppend,
    connection::Connection,
    events::{DecodeError, MessageType, SignalEnvelope},
};

/// Close reason sent when the upgrade lacks either identifier
pub const MISSING_IDENTITY_REASON: &str = "Missing sessionId or userId";

/// How long to wait for our close frame to flush before dropping the socket
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a chat frame waits on the store before it is relayed anyway
const CHAT_STORE_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl ConnectQuery {
    /// `(session_id, user_id)` when both are present and non-empty
    pub fn identity(&self) -> Option<(&str, &str)> {
        let session_id = self.session_id.as_deref().filter(|s| !s.is_empty())?;
        let user_id = self.user_id.as_deref().filter(|s| !s.is_empty())?;
        Some((session_id, user_id))
    }
}

/// Upgrades any path to a relay connection; plain HTTP requests get a 404
pub async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    query: Option<Query<ConnectQuery>>,
    State(state): State<AppState>,
) -> Response {
    let Some(ws) = ws else {
        return ApiError::NotFound.into_response();
    };
    let params = query.map(|Query(q)| q).unwrap_or_default();

    let tracker = state.shutdown.tracker().clone();
    ws.on_upgrade(move |socket| tracker.track_future(handle_socket(socket, params, state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: ConnectQuery, state: AppState) {
    let Some((session_id, user_id)) = params.identity() else {
        reject(socket).await;
        return;
    };

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let conn = Arc::new(Connection::new(user_id, session_id, tx));
    if let Some(displaced) = state.registry.register(Arc::clone(&conn)).await {
        displaced.supersede();
    }

    let active_sessions = state.registry.session_count().await;
    tracing::info!(
        connection_id = %conn.id,
        user_id = %user_id,
        session_id = %session_id,
        active_sessions = active_sessions,
        "WebSocket connection joined"
    );

    state
        .router
        .route(session_id, user_id, &SignalEnvelope::participant_joined(user_id))
        .await;

    // Spawn task to write queued frames to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let shutdown = state.shutdown.token();
    let mut pending = Vec::new();
    let mut close_reply: Option<(u16, &'static str)> = None;
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(connection_id = %conn.id, "Server shutting down, closing connection");
                close_reply = Some((close_code::AWAY, "Server shutting down"));
                break;
            }
            frame = receiver.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                handle_frame(SignalEnvelope::decode(&text), &conn, &state, &mut pending).await;
            }
            Some(Ok(Message::Binary(bytes))) => {
                handle_frame(SignalEnvelope::decode_bytes(&bytes), &conn, &state, &mut pending)
                    .await;
            }
            Some(Ok(Message::Close(_))) => {
                tracing::info!(connection_id = %conn.id, "WebSocket close frame received");
                close_reply = Some((close_code::NORMAL, ""));
                break;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Axum handles ping/pong automatically
            }
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %conn.id,
                    user_id = %conn.user_id,
                    session_id = %conn.session_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            None => break,
        }
    }

    close_connection(&conn, &state, pending).await;

    // Completes the closing handshake the client or the shutdown started
    if let Some((code, reason)) = close_reply {
        conn.queue_close(code, reason);
        let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task).await;
    }
    conn.mark_closed();
    send_task.abort();
}

/// Close the attempt with a policy violation; the socket is never registered
async fn reject(mut socket: WebSocket) {
    tracing::warn!("Rejecting WebSocket connection: missing sessionId or userId");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: MISSING_IDENTITY_REASON.into(),
        })))
        .await;
}

/// Dispatch one inbound frame
///
/// Chat appends that outlast `CHAT_STORE_WAIT` are left running and pushed
/// onto `pending` so the close path can wait for them.
async fn handle_frame(
    decoded: Result<SignalEnvelope, DecodeError>,
    conn: &Connection,
    state: &AppState,
    pending: &mut Vec<PendingAppend>,
) {
    let envelope = match decoded {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                connection_id = %conn.id,
                session_id = %conn.session_id,
                error = %e,
                "Discarding malformed frame"
            );
            return;
        }
    };

    match envelope.message_type() {
        Some(kind) if kind.is_signaling() => {
            state
                .router
                .route(&conn.session_id, &conn.user_id, &envelope)
                .await;
        }
        Some(MessageType::Chat) => {
            // Live delivery does not depend on the note being stored
            reap_finished(conn, pending);
            let mut append = state
                .chat
                .spawn_append(&conn.session_id, envelope.chat_payload());
            match tokio::time::timeout(CHAT_STORE_WAIT, &mut append).await {
                Ok(joined) => log_append_outcome(conn, joined),
                Err(_) => {
                    tracing::warn!(
                        session_id = %conn.session_id,
                        user_id = %conn.user_id,
                        "Chat store is slow, relaying before the note is saved"
                    );
                    pending.push(append);
                }
            }
            state
                .router
                .route(&conn.session_id, &conn.user_id, &envelope)
                .await;
        }
        _ => {
            tracing::debug!(
                connection_id = %conn.id,
                event_type = %envelope.kind(),
                "Ignoring unsupported message type"
            );
        }
    }
}

fn log_append_outcome(conn: &Connection, joined: Result<Result<(), StoreError>, JoinError>) {
    let result = joined.map_err(|e| StoreError::Task(e.to_string())).and_then(|r| r);
    if let Err(e) = result {
        tracing::error!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            error = %e,
            "Failed to save chat message"
        );
    }
}

/// Drop pending appends that have completed, logging any that failed
fn reap_finished(conn: &Connection, pending: &mut Vec<PendingAppend>) {
    pending.retain_mut(|append| match append.now_or_never() {
        Some(joined) => {
            log_append_outcome(conn, joined);
            false
        }
        None => true,
    });
}

/// Deregister and announce the departure, at most once per connection
///
/// Chat appends still running for this connection finish before it leaves.
async fn close_connection(conn: &Connection, state: &AppState, pending: Vec<PendingAppend>) {
    for append in pending {
        log_append_outcome(conn, append.await);
    }

    if !conn.begin_close() {
        return;
    }

    tracing::info!(
        connection_id = %conn.id,
        user_id = %conn.user_id,
        session_id = %conn.session_id,
        "WebSocket connection closing"
    );

    // A superseded socket no longer owns its key and must not announce a leave
    if state.registry.deregister_connection(conn).await {
        state
            .router
            .route(
                &conn.session_id,
                &conn.user_id,
                &SignalEnvelope::participant_left(&conn.user_id),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use sessionrelay_shared::{ChatStore, MemoryChatStore};
    use tokio::sync::Notify;

    /// Store whose appends wait until the test releases them
    struct StalledStore {
        release: Arc<Notify>,
        inner: MemoryChatStore,
    }

    #[async_trait]
    impl ChatStore for StalledStore {
        async fn load_notes(&self, session_id: &str) -> Result<Vec<Value>, StoreError> {
            self.inner.load_notes(session_id).await
        }

        async fn append_note(&self, session_id: &str, note: Value) -> Result<(), StoreError> {
            self.release.notified().await;
            self.inner.append_note(session_id, note).await
        }
    }

    fn query(session_id: Option<&str>, user_id: Option<&str>) -> ConnectQuery {
        ConnectQuery {
            session_id: session_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
        }
    }

    #[test]
    fn test_identity_requires_both_ids() {
        assert_eq!(query(Some("s1"), Some("u1")).identity(), Some(("s1", "u1")));
        assert_eq!(query(Some("s1"), None).identity(), None);
        assert_eq!(query(None, Some("u1")).identity(), None);
        assert_eq!(query(Some(""), Some("u1")).identity(), None);
        assert_eq!(query(Some("s1"), Some("")).identity(), None);
    }

    #[test]
    fn test_query_field_names() {
        let parsed: ConnectQuery =
            serde_json::from_value(json!({"sessionId": "s1", "userId": "u1", "extra": "x"}))
                .unwrap();
        assert_eq!(parsed.identity(), Some(("s1", "u1")));
    }

    async fn joined(
        state: &AppState,
        user_id: &str,
        session_id: &str,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(user_id, session_id, tx));
        state.registry.register(Arc::clone(&conn)).await;
        (conn, rx)
    }

    fn texts(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_chat_is_stored_then_forwarded() {
        let store = Arc::new(MemoryChatStore::new());
        let state = AppState::new(store.clone());
        let (u1, _rx1) = joined(&state, "u1", "s1").await;
        let (_u2, mut rx2) = joined(&state, "u2", "s1").await;

        let frame = SignalEnvelope::decode(r#"{"type":"chat","message":"hi","sentAt":1}"#);
        handle_frame(frame, &u1, &state, &mut Vec::new()).await;

        assert_eq!(store.load_notes("s1").await.unwrap(), vec![json!("hi")]);
        assert_eq!(
            texts(&mut rx2),
            vec![json!({"type": "chat", "message": "hi", "sentAt": 1})]
        );
    }

    #[tokio::test]
    async fn test_stalled_store_does_not_hold_back_signaling() {
        let release = Arc::new(Notify::new());
        let store = Arc::new(StalledStore {
            release: Arc::clone(&release),
            inner: MemoryChatStore::new(),
        });
        let state = AppState::new(store.clone());
        let (u1, _rx1) = joined(&state, "u1", "s1").await;
        let (_u2, mut rx2) = joined(&state, "u2", "s1").await;

        let mut pending = Vec::new();
        tokio::time::timeout(Duration::from_secs(3), async {
            let chat = SignalEnvelope::decode(r#"{"type":"chat","message":"hi"}"#);
            handle_frame(chat, &u1, &state, &mut pending).await;
            let offer = SignalEnvelope::decode(r#"{"type":"offer","sdp":"X"}"#);
            handle_frame(offer, &u1, &state, &mut pending).await;
        })
        .await
        .expect("signaling waited on the chat store");

        assert_eq!(
            texts(&mut rx2),
            vec![
                json!({"type": "chat", "message": "hi"}),
                json!({"type": "offer", "sdp": "X"}),
            ]
        );
        assert_eq!(pending.len(), 1);
        assert!(store.load_notes("s1").await.unwrap().is_empty());

        // Leaving waits for the late note, then announces the departure
        release.notify_one();
        close_connection(&u1, &state, pending).await;

        assert_eq!(store.load_notes("s1").await.unwrap(), vec![json!("hi")]);
        assert_eq!(
            texts(&mut rx2),
            vec![json!({"type": "participant-left", "userId": "u1"})]
        );
    }

    #[tokio::test]
    async fn test_unknown_and_relay_types_are_ignored() {
        let state = AppState::new(Arc::new(MemoryChatStore::new()));
        let (u1, mut rx1) = joined(&state, "u1", "s1").await;
        let (_u2, mut rx2) = joined(&state, "u2", "s1").await;

        for raw in [
            r#"{"type":"screen-share"}"#,
            r#"{"type":"participant-left","userId":"u2"}"#,
            r#"{"type":"no-participant"}"#,
        ] {
            handle_frame(SignalEnvelope::decode(raw), &u1, &state, &mut Vec::new()).await;
        }
        handle_frame(SignalEnvelope::decode("{broken"), &u1, &state, &mut Vec::new()).await;

        assert!(texts(&mut rx1).is_empty());
        assert!(texts(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn test_close_announces_leave_once() {
        let state = AppState::new(Arc::new(MemoryChatStore::new()));
        let (u1, _rx1) = joined(&state, "u1", "s1").await;
        let (_u2, mut rx2) = joined(&state, "u2", "s1").await;

        // Error followed by close for the same socket
        close_connection(&u1, &state, Vec::new()).await;
        close_connection(&u1, &state, Vec::new()).await;

        assert_eq!(
            texts(&mut rx2),
            vec![json!({"type": "participant-left", "userId": "u1"})]
        );
        assert_eq!(state.registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_superseded_connection_leaves_silently() {
        let state = AppState::new(Arc::new(MemoryChatStore::new()));
        let (old, mut rx_old) = joined(&state, "u1", "s1").await;
        let (_peer, mut rx_peer) = joined(&state, "u2", "s1").await;

        let (new, _rx_new) = joined(&state, "u1", "s1").await;
        old.supersede();
        close_connection(&old, &state, Vec::new()).await;

        assert!(matches!(rx_old.try_recv(), Ok(Message::Close(Some(_)))));
        assert!(texts(&mut rx_peer).is_empty());
        assert_eq!(
            state.registry.get(&new.key()).await.map(|c| c.id),
            Some(new.id)
        );
    }
}

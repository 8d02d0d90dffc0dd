//! Chat note persistence
//!
//! Every session keeps its chat history as one ordered JSON list. Appending is a
//! read-modify-write of that list, so callers must serialize appends per session.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Append-only chat history keyed by session id
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Load the ordered note history for a session (absent history is empty)
    async fn load_notes(&self, session_id: &str) -> Result<Vec<Value>, StoreError>;

    /// Append one note to the end of a session's history
    async fn append_note(&self, session_id: &str, note: Value) -> Result<(), StoreError>;
}

/// Parse the stored `notes` column; NULL and blank are an empty history
pub fn parse_notes(raw: Option<&str>) -> Result<Vec<Value>, StoreError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => Ok(serde_json::from_str(raw)?),
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Chat store backed by the `notes` column of `mentorship_sessions`
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn load_notes(&self, session_id: &str) -> Result<Vec<Value>, StoreError> {
        let raw = sqlx::query_scalar::<_, Option<String>>(
            "SELECT notes FROM mentorship_sessions WHERE id::text = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        parse_notes(raw.flatten().as_deref())
    }

    async fn append_note(&self, session_id: &str, note: Value) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock keeps other relay instances from interleaving with this write
        let row = sqlx::query_scalar::<_, Option<String>>(
            "SELECT notes FROM mentorship_sessions WHERE id::text = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(raw) = row else {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        };

        let mut notes = parse_notes(raw.as_deref())?;
        notes.push(note);

        sqlx::query("UPDATE mentorship_sessions SET notes = $1 WHERE id::text = $2")
            .bind(serde_json::to_string(&notes)?)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            session_id = %session_id,
            note_count = notes.len(),
            "Chat note appended"
        );

        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local chat store for development and tests
#[derive(Default)]
pub struct MemoryChatStore {
    notes: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn load_notes(&self, session_id: &str) -> Result<Vec<Value>, StoreError> {
        let notes = self.notes.read().await;
        Ok(notes.get(session_id).cloned().unwrap_or_default())
    }

    async fn append_note(&self, session_id: &str, note: Value) -> Result<(), StoreError> {
        let mut notes = self.notes.write().await;
        notes.entry(session_id.to_string()).or_default().push(note);
        Ok(())
    }
}

//! Live connection registry
//!
//! Maintains every open connection keyed by (user, session). Sessions are not
//! stored separately; they are the set of entries sharing a session id.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::connection::Connection;

/// Composite identity of a registered connection
///
/// Compared field by field, so `bob` never matches `bob2` and ids containing
/// `-` cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub user_id: String,
    pub session_id: String,
}

impl RegistryKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.user_id, self.session_id)
    }
}

/// Registry of live connections shared across all connection tasks
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<RegistryKey, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection, replacing any entry under the same key
    ///
    /// Returns the displaced connection when a different socket held the key.
    pub async fn register(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let key = conn.key();
        let mut connections = self.connections.write().await;
        let displaced = connections
            .insert(key.clone(), Arc::clone(&conn))
            .filter(|previous| previous.id != conn.id);

        tracing::info!(
            key = %key,
            connection_id = %conn.id,
            replaced = displaced.is_some(),
            total_connections = connections.len(),
            "Connection registered"
        );

        displaced
    }

    /// Remove the entry for `key`; absent keys are ignored
    ///
    /// The socket close path uses `deregister_connection` so a displaced
    /// socket cannot evict its replacement.
    pub async fn deregister(&self, key: &RegistryKey) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(key);
        if removed.is_some() {
            tracing::info!(
                key = %key,
                remaining_connections = connections.len(),
                "Connection deregistered"
            );
        }
        removed
    }

    /// Remove `conn` only if it is still the registered socket for its key
    ///
    /// A connection displaced by a reconnect must not evict its replacement.
    pub async fn deregister_connection(&self, conn: &Connection) -> bool {
        let key = conn.key();
        let mut connections = self.connections.write().await;
        match connections.get(&key) {
            Some(current) if current.id == conn.id => {
                connections.remove(&key);
                tracing::info!(
                    key = %key,
                    connection_id = %conn.id,
                    remaining_connections = connections.len(),
                    "Connection deregistered"
                );
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, key: &RegistryKey) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(key).cloned()
    }

    /// Snapshot of every connection in a session, in no particular order
    pub async fn list_by_session(&self, session_id: &str) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect()
    }

    /// First registered connection whose user id matches exactly, in any session
    ///
    /// The router's no-participant feedback looks up the exact `(user, session)`
    /// key with `get` instead, so it never lands on the user's socket in another
    /// session.
    pub async fn find_by_user(&self, user_id: &str) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.values().find(|c| c.user_id == user_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn session_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections
            .keys()
            .map(|k| k.session_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

//! Chat persistence path
//!
//! Appends are a read-modify-write of the whole session history, so two
//! appends for the same session must never overlap. Each session gets its own
//! lock; sessions never wait on each other. Appends run on the shared task
//! tracker so a closing socket cannot cancel one halfway and shutdown can wait
//! for them.

use serde_json::Value;
use sessionrelay_shared::{ChatStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// A chat append running on the tracker; dropping it does not cancel the write
pub type PendingAppend = JoinHandle<Result<(), StoreError>>;

pub struct ChatJournal {
    store: Arc<dyn ChatStore>,
    /// session_id -> append lock, dropped once no append holds it
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    tracker: TaskTracker,
}

impl ChatJournal {
    pub fn new(store: Arc<dyn ChatStore>, tracker: TaskTracker) -> Self {
        Self {
            store,
            session_locks: Mutex::new(HashMap::new()),
            tracker,
        }
    }

    /// Start an append without waiting for it
    ///
    /// Appends for one session never overlap and queue in the order their
    /// tasks first run.
    pub fn spawn_append(self: &Arc<Self>, session_id: &str, note: Value) -> PendingAppend {
        let journal = Arc::clone(self);
        let session_id = session_id.to_string();
        self.tracker
            .spawn(async move { journal.append_serialized(&session_id, note).await })
    }

    async fn append_serialized(&self, session_id: &str, note: Value) -> Result<(), StoreError> {
        let lock = self.session_lock(session_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.store.append_note(session_id, note).await
        };
        drop(lock);
        self.release_session_lock(session_id).await;
        result
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    async fn release_session_lock(&self, session_id: &str) {
        let mut locks = self.session_locks.lock().await;
        // Only the map still holds it: no append in flight or waiting
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }
}

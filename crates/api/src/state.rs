//! Shared application state

use sessionrelay_shared::ChatStore;
use std::sync::Arc;

use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ChatJournal, ConnectionRegistry, SessionRouter};

/// State handed to every route and connection task
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub router: SessionRouter,
    pub chat: Arc<ChatJournal>,
    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        let shutdown = ShutdownCoordinator::new();
        let registry = Arc::new(ConnectionRegistry::new());

        Self {
            router: SessionRouter::new(Arc::clone(&registry)),
            chat: Arc::new(ChatJournal::new(store, shutdown.tracker().clone())),
            registry,
            shutdown,
        }
    }
}

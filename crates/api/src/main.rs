//! Session relay server: HTTP health check + WebSocket signaling on one port

use anyhow::Context;
use sessionrelay_api::{config::LogFormat, routes::create_router, AppState, Config};
use sessionrelay_shared::{create_pool, ChatStore, MemoryChatStore, PgChatStore};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    match format {
        LogFormat::Json => fmt().with_env_filter(env_filter).json().init(),
        LogFormat::Pretty => fmt().with_env_filter(env_filter).with_target(false).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let store: Arc<dyn ChatStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("failed to connect to chat store database")?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "Chat store connected to Postgres"
            );
            Arc::new(PgChatStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, chat history is kept in memory only");
            Arc::new(MemoryChatStore::new())
        }
    };

    let state = AppState::new(store);
    let app = create_router(state.clone());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(port = config.port, "HTTP + WebSocket server running");

    let coordinator = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            coordinator.shutdown();
        })
        .await
        .context("server error")?;

    state
        .shutdown
        .graceful_shutdown(config.shutdown_timeout)
        .await;

    tracing::info!("Server stopped");
    Ok(())
}

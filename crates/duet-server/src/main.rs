//! # duet-server
//!
//! HTTP server for the duet messaging core.
//!
//! This binary provides:
//! - **REST API** (axum) for sending messages, reading history,
//!   managing chat heads, and the notification surface
//! - **SSE streams** bridging the in-process broadcast hub to live
//!   clients (`/stream/chat/{chatId}`, `/stream/inbox/{userId}`)
//! - **SQLite persistence** via `duet-store`
//!
//! Authentication is handled upstream; callers identify themselves via
//! explicit `user_id` parameters.

mod api;
mod config;
mod error;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;

use duet_chat::{Broadcaster, ChatService, Notifier};
use duet_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duet_server=debug")),
        )
        .init();

    info!("Starting duet messaging server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open_default()?,
    };
    let db = Arc::new(Mutex::new(database));

    let broadcaster = Broadcaster::new();
    let notifier = Notifier::new(db.clone());
    let service = ChatService::new(db, broadcaster, notifier);

    let app_state = AppState {
        service,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

//! # palaver-server
//!
//! Centralized text-chat relay. Clients connect over TCP, register a
//! unique display name, and exchange broadcast and private messages routed
//! through this single process.
//!
//! This binary provides:
//! - **Connection registry** enforcing display-name uniqueness
//! - **Message router** serializing join/leave/broadcast/private-send so
//!   every peer observes them in one global order
//! - **Pipe-delimited line protocol** (from `palaver-shared`)
//! - **Operator console** on stdin (`status`, `help`, `stop`)

mod config;
mod console;
mod error;
mod listener;
mod peer;
mod registry;
mod router;
mod session;

use std::time::Instant;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_shared::constants::SERVER_SENDER;
use palaver_shared::MessageKind;

use crate::config::ServerConfig;
use crate::router::Router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,palaver_server=debug")),
        )
        .init();

    info!("Starting palaver relay server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Bind the listener; this is the one fatal startup error
    // -----------------------------------------------------------------------
    let tcp_listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    // -----------------------------------------------------------------------
    // 4. Routing core and shutdown plumbing
    // -----------------------------------------------------------------------
    let router = Router::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

    // -----------------------------------------------------------------------
    // 5. Operator console on stdin
    // -----------------------------------------------------------------------
    let started = Instant::now();
    let console = tokio::spawn(console::run(router.clone(), stop_tx, started));

    // -----------------------------------------------------------------------
    // 6. Serve until Ctrl+C or a console `stop`
    // -----------------------------------------------------------------------
    tokio::select! {
        _ = listener::serve(tcp_listener, config.clone(), router.clone(), shutdown_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = stop_rx.recv() => {}
    }

    // -----------------------------------------------------------------------
    // 7. Ordered shutdown: farewell first, then release the sessions
    // -----------------------------------------------------------------------
    router
        .broadcast(SERVER_SENDER, "Server is shutting down...", MessageKind::Server)
        .await;
    let _ = shutdown_tx.send(true);
    console.abort();

    info!("Server stopped");
    Ok(())
}

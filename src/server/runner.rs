//! Server execution logic.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::common::logger::EventLog;
use crate::server::handler::websocket_handler;
use crate::server::monitor::{ActivityMonitor, DEFAULT_IDLE_TIMEOUT, MONITOR_TICK};
use crate::server::signal::shutdown_signal;
use crate::server::state::AppState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Startup settings, normally filled from the CLI.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub idle_timeout: Duration,
    pub monitor_tick: Duration,
    pub log_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            monitor_tick: MONITOR_TICK,
            log_file: PathBuf::from("messaging_system.log"),
        }
    }
}

/// The single route: a WebSocket upgrade at `/`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .with_state(state)
}

/// Serve connections on an already-bound listener until it errors. Used by
/// the integration tests, which bring their own listener and monitor.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await
}

/// Run the chat server until a shutdown signal arrives.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let state = Arc::new(AppState::new(EventLog::open(&config.log_file)));

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;

    state
        .events
        .record(&format!("system listening on {}", listener.local_addr()?));
    tracing::info!("connect to: ws://{bind_addr}/?name=<identifier>");
    tracing::info!("press ctrl+c to shut down gracefully");

    let monitor = ActivityMonitor::spawn(state.clone(), config.idle_timeout, config.monitor_tick);

    let app = router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.shutdown().await;
    state.events.record("system shut down");

    Ok(())
}

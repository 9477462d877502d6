//! Web server for the pin dashboard.
//!
//! A thin adapter over the monitor: REST endpoints read the latest snapshot
//! and history, and each WebSocket connection owns one subscription.

pub mod config;
pub mod handlers;
pub mod router;
pub mod websocket;

pub use config::WebConfig;
pub use router::{create_app, AppState};

use crate::error::{MonitorError, Result};
use crate::monitor::MonitorHandle;
use std::net::SocketAddr;
use tracing::info;

/// Serve the dashboard until the monitor is asked to shut down.
pub async fn start_web_server(config: WebConfig, monitor: MonitorHandle) -> Result<()> {
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| MonitorError::config_error(format!("Invalid bind address: {}", e)))?;

    let app = create_app(config, monitor.clone());

    info!("Starting pinwatch web server on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);
    info!("API endpoint: http://{}/api/gpio/status", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MonitorError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { monitor.shutdown_requested().await })
        .await
        .map_err(|e| MonitorError::web_server_error(format!("Server error: {}", e)))?;

    info!("Web server stopped");
    Ok(())
}

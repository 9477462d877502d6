//! Web application router and middleware setup.

use crate::monitor::MonitorHandle;
use crate::web::config::WebConfig;
use crate::web::{handlers, websocket};
use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub monitor: MonitorHandle,
    pub config: Arc<WebConfig>,
    /// One permit per allowed WebSocket connection
    pub ws_slots: Arc<Semaphore>,
}

/// Create the axum application with all routes and middleware.
pub fn create_app(config: WebConfig, monitor: MonitorHandle) -> Router {
    let static_path = config.static_path.clone().map(PathBuf::from);
    let enable_cors = config.enable_cors;
    let state = AppState {
        monitor,
        ws_slots: Arc::new(Semaphore::new(config.max_websocket_connections)),
        config: Arc::new(config),
    };

    let mut app = Router::new()
        .route("/api/gpio/status", get(handlers::gpio_status))
        .route("/api/gpio/transitions", get(handlers::gpio_transitions))
        .route("/api/gpio/history/:pin", get(handlers::gpio_history))
        .route("/api/gpio/reset", post(handlers::reset_counters))
        .route(
            "/api/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        .route("/api/health", get(handlers::health_check))
        .route("/ws", get(websocket::websocket_handler));

    match static_path {
        Some(path) if path.join("index.html").exists() => {
            info!("Serving dashboard from {:?}", path);
            app = app
                .nest_service("/static", ServeDir::new(&path))
                .route("/", get(handlers::serve_index));
        }
        Some(path) => {
            warn!("Static path {:?} has no index.html, serving default dashboard", path);
            app = app.route("/", get(handlers::default_index));
        }
        None => {
            app = app.route("/", get(handlers::default_index));
        }
    }

    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

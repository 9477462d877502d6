//! HTTP handlers for API endpoints.

use crate::error::MonitorError;
use crate::pins::{PinId, Snapshot};
use crate::web::router::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path as FsPath;
use tracing::{error, info, warn};

/// History entries attached to each pin by the status endpoint.
pub const STATUS_HISTORY_LEN: usize = 50;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Look-back window in whole hours; defaults to one
    pub hours: Option<u32>,
}

/// Latest snapshot with recent history attached to every pin.
pub async fn gpio_status(State(state): State<AppState>) -> Result<Json<Snapshot>, StatusCode> {
    let snapshot = state
        .monitor
        .latest_snapshot()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let history = state.monitor.broadcaster().history();
    Ok(Json(snapshot.with_history(history, STATUS_HISTORY_LEN)))
}

/// Transition count per pin.
pub async fn gpio_transitions(State(state): State<AppState>) -> Json<BTreeMap<PinId, u64>> {
    Json(state.monitor.transition_summary())
}

/// Completed HIGH intervals for one pin. Ids outside the pin range have no
/// history rather than being a bad request.
pub async fn gpio_history(
    State(state): State<AppState>,
    Path(pin): Path<u32>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let hours = params.hours.unwrap_or(1);
    match PinId::try_from(pin) {
        Ok(pin) => Json(state.monitor.query_history(pin, hours)).into_response(),
        Err(_) => Json(json!({ "pin": pin, "history": [] })).into_response(),
    }
}

/// Reset all transition counters and history.
pub async fn reset_counters(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.monitor.reset().await {
        Ok(at) => {
            info!("Counters reset via API");
            Ok(Json(json!({
                "status": "success",
                "message": "Counters reset",
                "reset_at": at,
            })))
        }
        Err(e) => {
            error!("Failed to reset counters: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// Body of `POST /api/config`. Only labels can change while running.
#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub pin_labels: BTreeMap<String, String>,
}

/// Monitored pins, labels and poll interval.
pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    let labels = state.monitor.labels();

    Json(json!({
        "pins_monitored": state.monitor.config().pin_ids(),
        "update_interval": state.monitor.poll_interval().as_secs_f64(),
        "history_retention_hours": state.monitor.config().retention.as_secs_f64() / 3600.0,
        "pin_labels": labels,
    }))
}

/// Rename pins at runtime.
pub async fn update_config(
    State(state): State<AppState>,
    body: Result<Json<ConfigUpdate>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Json(update) = match body {
        Ok(body) => body,
        Err(e) => return config_rejected(e.body_text()),
    };

    let mut labels = BTreeMap::new();
    for (key, label) in update.pin_labels {
        match key.parse::<PinId>() {
            Ok(pin) => {
                labels.insert(pin, label);
            }
            Err(_) => return config_rejected(format!("invalid pin id: {}", key)),
        }
    }

    match state.monitor.update_labels(labels).await {
        Ok(changed) => {
            info!("Pin labels updated via API: {:?}", changed);
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "Configuration updated",
                    "updated": changed,
                })),
            )
        }
        Err(MonitorError::Shutdown) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "error", "message": "monitor is not running"})),
        ),
        Err(e) => config_rejected(e.to_string()),
    }
}

fn config_rejected(message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    let message = message.into();
    warn!("Rejected config update: {}", message);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"status": "error", "message": message})),
    )
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "pinwatch",
        "version": env!("CARGO_PKG_VERSION"),
        "monitor": state.monitor.status(),
        "subscribers": state.monitor.broadcaster().subscriber_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Serve `index.html` from the configured static directory.
pub async fn serve_index(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let dir = state.config.static_path.as_deref().unwrap_or("static");
    let path = FsPath::new(dir).join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Html(content)),
        Err(e) => {
            error!("Failed to read {:?}: {}", path, e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

/// Built-in dashboard used when no static directory is configured.
pub async fn default_index() -> Html<&'static str> {
    Html(DEFAULT_INDEX_HTML)
}

const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>pinwatch</title>
    <style>
        body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 20px; background: #f4f5f7; }
        h1 { margin-bottom: 4px; }
        #status { color: #666; margin-bottom: 16px; }
        .grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr)); gap: 12px; }
        .pin { background: white; border-radius: 8px; padding: 12px; box-shadow: 0 2px 6px rgba(0,0,0,0.08); }
        .pin.high { border-left: 6px solid #2e7d32; }
        .pin.low { border-left: 6px solid #9e9e9e; }
        .pin.stale { opacity: 0.6; }
        .pin .label { font-weight: 600; }
        .pin .meta { font-size: 0.85rem; color: #555; }
        button { margin-bottom: 16px; }
    </style>
</head>
<body>
    <h1>pinwatch</h1>
    <div id="status">Connecting...</div>
    <button id="reset">Reset counters</button>
    <div class="grid" id="pins"></div>
    <script>
        const cards = {};
        let ws;

        function render(pin, view) {
            let card = cards[pin];
            if (!card) {
                card = document.createElement('div');
                document.getElementById('pins').appendChild(card);
                cards[pin] = card;
            }
            card.className = 'pin ' + (view.state ? 'high' : 'low') + (view.stale ? ' stale' : '');
            card.innerHTML = `
                <div class="label">${view.label} (GPIO ${pin})</div>
                <div>${view.state ? 'HIGH' : 'LOW'}</div>
                <div class="meta">transitions: ${view.transitions}</div>
                <div class="meta">high for: ${view.current_high_duration.toFixed(1)}s</div>
                <div class="meta">last change: ${view.last_transition ?? '-'}</div>`;
        }

        function onSnapshot(snapshot, full) {
            const pins = full ? Object.keys(snapshot.pins) : snapshot.changed.map(String);
            for (const pin of pins) {
                render(pin, snapshot.pins[pin]);
            }
            for (const pin of Object.keys(snapshot.pins)) {
                if (snapshot.pins[pin].state && !pins.includes(pin)) {
                    render(pin, snapshot.pins[pin]);
                }
            }
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);
            let first = true;
            ws.onopen = () => { document.getElementById('status').textContent = 'Connected'; };
            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                if (msg.type === 'gpio_update') {
                    onSnapshot(msg.data, first);
                    first = false;
                } else if (msg.type === 'counters_reset') {
                    first = true;
                }
            };
            ws.onclose = () => {
                document.getElementById('status').textContent = 'Disconnected, retrying...';
                setTimeout(connect, 2000);
            };
        }

        document.getElementById('reset').onclick = () => {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify({ type: 'reset_counters' }));
            }
        };

        connect();
    </script>
</body>
</html>"#;

//! Tracking start/stop and status endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/tracking` — connection state and tracking status.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "connection": *state.connection_state.borrow(),
        "running": state.tracking.is_running(),
        "frequency": state.settings.get(),
    }))
}

/// `POST /api/tracking/start` — the start-tracking button. Queues a start
/// request; connect outcomes surface on `/api/events`.
pub async fn start(State(state): State<AppState>) -> Json<Value> {
    state.screen.start_tracking();
    Json(json!({"requested": "start"}))
}

/// `POST /api/tracking/stop` — the stop-tracking button.
pub async fn stop(State(state): State<AppState>) -> Json<Value> {
    state.screen.stop_tracking();
    Json(json!({"requested": "stop"}))
}

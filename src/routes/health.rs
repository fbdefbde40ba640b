//! Unauthenticated health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/health` — liveness probe.
///
/// Returns status, uptime, version, connection state, tracking status, and
/// the last-update readout. No authentication required, suitable for
/// load-balancer health checks.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.start_time.elapsed().as_secs();
    let connection = *state.connection_state.borrow();
    let last_update = state.screen.last_update().await;

    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
        "connection": connection,
        "tracking_running": state.tracking.is_running(),
        "frequency": state.settings.get(),
        "last_update": last_update,
        "samples_total": state.store.samples_total().await,
    }))
}

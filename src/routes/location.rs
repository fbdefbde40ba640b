//! Location data endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/location` — last known sample, its age, and recent history.
pub async fn get_location(State(state): State<AppState>) -> Json<Value> {
    let last = state.store.last().await;
    let age_secs = state.store.last_age_secs().await;
    let history = state.store.history(50).await;

    Json(json!({
        "last": last,
        "age_secs": age_secs,
        "history": history,
        "samples_total": state.store.samples_total().await,
    }))
}

/// `DELETE /api/location` — clear all stored samples (the "clear data"
/// button).
pub async fn clear_location(State(state): State<AppState>) -> Json<Value> {
    state.screen.clear_data().await;
    Json(json!({"cleared": true}))
}

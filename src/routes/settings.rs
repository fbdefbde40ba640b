//! Frequency tier endpoints (the radio group).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::settings::FrequencyTier;
use crate::AppState;

#[derive(Deserialize)]
pub struct FrequencyRequest {
    pub frequency: String,
}

/// `GET /api/settings/frequency` — current tier.
pub async fn get_frequency(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"frequency": state.settings.get()}))
}

/// `PUT /api/settings/frequency` — select a tier. Restarts the tracking
/// service (stop then start) so the new cadence takes effect.
pub async fn put_frequency(
    State(state): State<AppState>,
    Json(body): Json<FrequencyRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Some(tier) = FrequencyTier::from_str_opt(&body.frequency) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("Unknown frequency {:?} (expected high, medium, or low)", body.frequency),
            })),
        ));
    };

    state.screen.select_frequency(tier);
    Ok(Json(json!({"frequency": tier})))
}

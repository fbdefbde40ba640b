//! Server-Sent Events (SSE) endpoint.
//!
//! `GET /api/events` — push-based stream of `location.updated` and
//! `connection.*` events for dashboards and monitoring. Subscribes to the
//! same broadcast channel the tracker and coordinator publish to.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};

use crate::AppState;

/// `GET /api/events` — SSE event stream.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.events.subscribe();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(value) => {
                let event_type = value["type"].as_str().unwrap_or("message").to_string();
                let data = serde_json::to_string(&value).unwrap_or_default();
                Some((Ok(Event::default().event(event_type).data(data)), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                // Notify the client they missed events
                let event = Event::default()
                    .event("error")
                    .data(format!(r#"{{"code":"LAGGED","missed":{n}}}"#));
                Some((Ok(event), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => None,
        }
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default().interval(std::time::Duration::from_secs(15)))
}

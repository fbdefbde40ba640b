//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::config::Config;
use crate::coordinator::ConnectionState;
use crate::screen::ScreenController;
use crate::settings::SettingsStore;
use crate::store::LocationStore;
use crate::tracker::{NmeaDeviceSource, TrackingServiceController};

/// Shared application state for the geotrackd server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Last-known sample + history + change feed.
    pub store: Arc<LocationStore>,
    /// Current frequency tier.
    pub settings: SettingsStore,
    /// Presentation layer: actions and the "last update" readout.
    pub screen: Arc<ScreenController>,
    /// Tracking service controller, queried for running status.
    pub tracking: Arc<TrackingServiceController<NmeaDeviceSource>>,
    /// Read side of the coordinator's connection state.
    pub connection_state: watch::Receiver<ConnectionState>,
    /// Broadcast channel for location/connection events (SSE source).
    pub events: broadcast::Sender<Value>,
}

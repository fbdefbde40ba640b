#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # geotrackd
//!
//! Background location tracking daemon for Linux devices.
//!
//! geotrackd connects to a GNSS receiver, samples location fixes on a
//! configurable cadence (high / medium / low), keeps a bounded in-memory
//! history, and exposes the track over an HTTP API protected by a
//! pre-shared API key. Live updates stream over Server-Sent Events.
//!
//! ## Subcommands
//!
//! - `geotrackd serve` (default) — run the daemon
//!
//! ## API surface
//!
//! | Method | Path                      | Auth | Description                      |
//! |--------|---------------------------|------|----------------------------------|
//! | GET    | `/api/health`             | No   | Liveness probe                   |
//! | GET    | `/api/location`           | Yes  | Last fix, age, recent history    |
//! | DELETE | `/api/location`           | Yes  | Clear stored history             |
//! | GET    | `/api/tracking`           | Yes  | Connection + tracking status     |
//! | POST   | `/api/tracking/start`     | Yes  | Request tracking start           |
//! | POST   | `/api/tracking/stop`      | Yes  | Request tracking stop            |
//! | GET    | `/api/settings/frequency` | Yes  | Current frequency tier           |
//! | PUT    | `/api/settings/frequency` | Yes  | Select tier (restarts sampler)   |
//! | GET    | `/api/events`             | Yes  | SSE stream of live events        |
//!
//! ## Architecture
//!
//! ```text
//! main.rs        — entry point, clap subcommands, router setup, graceful shutdown
//! coordinator.rs — connection state machine (connect, failures, remediation)
//! provider.rs    — GNSS provider client, availability probe, remediation command
//! tracker.rs     — tracking service: periodic sampling, NMEA RMC parsing
//! store.rs       — bounded location history with change feed
//! settings.rs    — frequency tier store (watch channel)
//! screen.rs      — status screen controller (readout + user actions)
//! auth.rs        — Bearer token middleware, constant-time comparison
//! config.rs      — TOML + env-var configuration
//! routes/        — REST/SSE handlers
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use geotrackd::auth::{self, ApiKey};
use geotrackd::config::Config;
use geotrackd::coordinator::{
    coordinator_channel, spawn_coordinator, ConnectionCoordinator, ConnectionState,
};
use geotrackd::provider::{CommandResolution, DeviceProviderFactory};
use geotrackd::routes;
use geotrackd::screen::ScreenController;
use geotrackd::settings::SettingsStore;
use geotrackd::state::AppState;
use geotrackd::store::LocationStore;
use geotrackd::tracker::{NmeaDeviceSource, TrackingServiceController};

/// Background location tracking daemon for Linux devices.
#[derive(Parser)]
#[command(name = "geotrackd", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { config }) => {
            run_server(config.as_deref()).await;
        }
        None => {
            // Backward compat: no subcommand but --config may be passed
            let args: Vec<String> = std::env::args().collect();
            let config_path = args
                .windows(2)
                .find(|w| w[0] == "--config")
                .map(|w| w[1].clone());
            run_server(config_path.as_deref()).await;
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("geotrackd v{} starting", env!("CARGO_PKG_VERSION"));
    info!("GNSS device: {}", config.provider.device);
    info!("Listening on {}", config.server.listen);

    if config.auth.api_key == "change-me" {
        warn!("Using default API key — set GEOTRACKD_API_KEY or update config");
    }

    let store = Arc::new(LocationStore::new(config.tracking.history_size));
    let settings = SettingsStore::new(config.tracking.frequency);
    let (events, _) = broadcast::channel(256);

    let (coordinator_handle, coordinator_rx) = coordinator_channel();

    let source = Arc::new(NmeaDeviceSource::new(config.provider.device.clone()));
    let tracking = Arc::new(TrackingServiceController::new(
        source,
        store.clone(),
        settings.clone(),
        config.tracking.clone(),
        events.clone(),
    ));

    let provider = Box::new(DeviceProviderFactory::new(
        config.provider.device.clone(),
        coordinator_handle.sender(),
    ));
    let resolution = Box::new(CommandResolution::new(
        config.provider.resolution_command.clone(),
        coordinator_handle.sender(),
    ));

    let (errors_tx, errors_rx) = broadcast::channel(16);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let coordinator = ConnectionCoordinator::new(
        provider,
        resolution,
        tracking.clone(),
        errors_tx,
        state_tx,
    );
    let coordinator_task = spawn_coordinator(coordinator, coordinator_rx);

    // Forward coordinator errors onto the SSE event feed
    let error_feed = events.clone();
    let error_forwarder = tokio::spawn(async move {
        let mut errors_rx = errors_rx;
        loop {
            match errors_rx.recv().await {
                Ok(err) => {
                    let _ = error_feed.send(json!({
                        "type": "connection.error",
                        "error": err,
                    }));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Forward connection state transitions onto the SSE event feed
    let state_feed = events.clone();
    let mut state_watch = state_rx.clone();
    let state_forwarder = tokio::spawn(async move {
        while state_watch.changed().await.is_ok() {
            let state = *state_watch.borrow_and_update();
            let _ = state_feed.send(json!({
                "type": "connection.state",
                "state": state,
            }));
        }
    });

    let screen = Arc::new(ScreenController::new(
        store.clone(),
        settings.clone(),
        coordinator_handle.clone(),
    ));
    screen.show().await;

    if config.tracking.autostart {
        info!("Autostart enabled, requesting tracking start");
        screen.start_tracking();
    }

    let state = AppState {
        config: Arc::new(config),
        start_time: Instant::now(),
        store,
        settings,
        screen: screen.clone(),
        tracking: tracking.clone(),
        connection_state: state_rx,
        events,
    };

    // Build router
    let public_routes = Router::new().route("/api/health", get(routes::health::health));

    let authed_routes = Router::new()
        .route(
            "/api/location",
            get(routes::location::get_location).delete(routes::location::clear_location),
        )
        .route("/api/tracking", get(routes::tracking::status))
        .route("/api/tracking/start", post(routes::tracking::start))
        .route("/api/tracking/stop", post(routes::tracking::stop))
        .route(
            "/api/settings/frequency",
            get(routes::settings::get_frequency).put(routes::settings::put_frequency),
        )
        .route("/api/events", get(routes::events::event_stream))
        .layer(middleware::from_fn(auth::require_api_key));

    let app = Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .layer(Extension(ApiKey(state.config.auth.api_key.clone())))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = match TcpListener::bind(&state.config.server.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {e}", state.config.server.listen);
            return;
        }
    };

    info!("Server ready");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {e}");
    }

    // Cleanup
    info!("Shutting down...");
    screen.hide();
    screen.stop_tracking();
    coordinator_task.abort();
    error_forwarder.abort();
    state_forwarder.abort();
    info!("Goodbye");
}

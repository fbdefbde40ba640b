#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]

//! geotrackd library — exposes core modules for embedding or testing.
//!
//! This library re-exports the key building blocks:
//! - `coordinator` — provider connection state machine
//! - `tracker` — the tracking service (periodic GNSS sampling)
//! - `provider` — location provider client, availability, remediation
//! - `store` — bounded in-memory location history
//! - `settings` — update frequency tier store
//! - `screen` — status screen controller (live readout, user actions)
//! - `auth` — API key authentication middleware
//! - `config` — configuration loading
//! - `routes` — REST API route handlers

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod provider;
pub mod routes;
pub mod screen;
pub mod settings;
pub mod state;
pub mod store;
pub mod tracker;
pub mod util;

// Re-export key types at crate root for convenience.
pub use auth::ApiKey;
pub use config::Config;
pub use coordinator::{ConnectionCoordinator, ConnectionState, CoordinatorHandle};
pub use screen::ScreenController;
pub use settings::{FrequencyTier, SettingsStore};
pub use state::AppState;
pub use store::{LocationSample, LocationStore};
pub use tracker::TrackingServiceController;

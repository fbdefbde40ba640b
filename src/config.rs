//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `GEOTRACKD_API_KEY`, `GEOTRACKD_LISTEN`,
//!    `GEOTRACKD_DEVICE`
//! 2. **Config file** — path via `--config <path>`, or `geotrackd.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:1338"
//!
//! [auth]
//! api_key = "your-secret-key"
//!
//! [provider]
//! device = "/dev/gnss0"
//! # Optional remediation command run when a connect attempt fails with a
//! # resolvable error (e.g. a udev/permissions fixup). Omit to disable.
//! resolution_command = "sudo /usr/local/bin/fix-gnss-perms"
//!
//! [tracking]
//! frequency = "medium"            # high | medium | low
//! high_interval_secs = 10
//! medium_interval_secs = 60
//! low_interval_secs = 300
//! history_size = 500
//! sample_timeout_secs = 5
//! autostart = false
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::settings::FrequencyTier;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:1338`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Pre-shared Bearer token. Override with `GEOTRACKD_API_KEY` env var.
    /// Defaults to `"change-me"` which triggers a startup warning.
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

/// Location provider (GNSS device) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// GNSS character device to read NMEA sentences from (default `/dev/gnss0`).
    /// Override with `GEOTRACKD_DEVICE`.
    #[serde(default = "default_device")]
    pub device: String,
    /// Remediation command for resolvable connect failures. Run via `sh -c`;
    /// a zero exit status counts as a successful resolution. None disables
    /// the resolution flow (launch failures fall back to a raw reconnect).
    pub resolution_command: Option<String>,
}

/// Tracking cadence and history settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Frequency tier active at startup (default `medium`).
    #[serde(default)]
    pub frequency: FrequencyTier,
    /// Sampling interval for the `high` tier in seconds (default 10).
    #[serde(default = "default_high_interval")]
    pub high_interval_secs: u64,
    /// Sampling interval for the `medium` tier in seconds (default 60).
    #[serde(default = "default_medium_interval")]
    pub medium_interval_secs: u64,
    /// Sampling interval for the `low` tier in seconds (default 300).
    #[serde(default = "default_low_interval")]
    pub low_interval_secs: u64,
    /// Maximum samples kept in the in-memory history ring (default 500).
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Per-sample read timeout in seconds (default 5).
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout_secs: u64,
    /// Request tracking start at daemon startup (default false).
    #[serde(default)]
    pub autostart: bool,
}

impl TrackingConfig {
    /// Sampling interval for a tier.
    #[must_use]
    pub fn interval_secs(&self, tier: FrequencyTier) -> u64 {
        match tier {
            FrequencyTier::High => self.high_interval_secs,
            FrequencyTier::Medium => self.medium_interval_secs,
            FrequencyTier::Low => self.low_interval_secs,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:1338".to_string()
}
fn default_api_key() -> String {
    "change-me".to_string()
}
fn default_device() -> String {
    "/dev/gnss0".to_string()
}
fn default_high_interval() -> u64 {
    10
}
fn default_medium_interval() -> u64 {
    60
}
fn default_low_interval() -> u64 {
    300
}
fn default_history_size() -> usize {
    500
}
fn default_sample_timeout() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            resolution_command: None,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            frequency: FrequencyTier::default(),
            high_interval_secs: default_high_interval(),
            medium_interval_secs: default_medium_interval(),
            low_interval_secs: default_low_interval(),
            history_size: default_history_size(),
            sample_timeout_secs: default_sample_timeout(),
            autostart: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            provider: ProviderConfig::default(),
            tracking: TrackingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `geotrackd.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("geotrackd.toml").exists() {
            let content =
                std::fs::read_to_string("geotrackd.toml").expect("Failed to read geotrackd.toml");
            toml::from_str(&content).expect("Failed to parse geotrackd.toml")
        } else {
            Config::default()
        };

        // Env var overrides
        if let Ok(key) = std::env::var("GEOTRACKD_API_KEY") {
            config.auth.api_key = key;
        }
        if let Ok(listen) = std::env::var("GEOTRACKD_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(device) = std::env::var("GEOTRACKD_DEVICE") {
            config.provider.device = device;
        }

        config
    }
}

//! Location provider capability: availability probe, connect attempts, and
//! the interactive resolution flow.
//!
//! The coordinator talks to the provider through three small traits so tests
//! can replay connection outcomes deterministically. The production
//! implementation is backed by a GNSS character device: "connecting" is an
//! async open of the device node, and "resolution" is an operator-configured
//! remediation command (e.g. a udev/permissions fixup).

use std::io::ErrorKind;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::coordinator::CoordinatorEvent;

/// Result of the provider-availability check, performed once per
/// client-creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    ServiceMissing,
    ServiceUpdateRequired,
    ServiceDisabled,
    /// Any other probe outcome; treated as unavailable with no prompt.
    Other(i32),
}

/// Error descriptor carried by a failed connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureInfo {
    /// Provider-specific error code (OS errno for the device backend).
    pub code: i32,
    /// Whether an interactive resolution flow can fix this failure.
    pub resolvable: bool,
}

/// The resolution flow could not be launched at all (signaled synchronously).
#[derive(Debug)]
pub struct ResolutionLaunchError(pub String);

impl std::fmt::Display for ResolutionLaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "resolution launch failed: {}", self.0)
    }
}

impl std::error::Error for ResolutionLaunchError {}

/// A connection to the location provider. `connect()` initiates an async
/// attempt; the outcome arrives later as a [`CoordinatorEvent`]. The
/// coordinator's state machine is the authoritative record of connection
/// state, so the capability exposes no state queries.
pub trait ProviderClient: Send {
    fn connect(&mut self);
}

/// Creates provider clients, gated by the availability check.
pub trait ProviderFactory: Send {
    fn check_availability(&self) -> Availability;
    fn build_client(&self) -> Box<dyn ProviderClient>;
}

/// Launches the interactive resolution flow for a resolvable failure.
pub trait ResolutionLauncher: Send {
    /// Start the flow identified by `token`. A synchronous `Err` means the
    /// flow never launched; an `Ok` means the outcome will arrive later as
    /// [`CoordinatorEvent::ResolutionFinished`].
    fn start_resolution(
        &mut self,
        failure: &FailureInfo,
        token: u32,
    ) -> Result<(), ResolutionLaunchError>;
}

// ── GNSS device backend ──────────────────────────────────────────────

/// Provider factory backed by a GNSS character device node.
pub struct DeviceProviderFactory {
    device: String,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl DeviceProviderFactory {
    #[must_use]
    pub fn new(device: String, events: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self { device, events }
    }
}

impl ProviderFactory for DeviceProviderFactory {
    fn check_availability(&self) -> Availability {
        match std::fs::metadata(&self.device) {
            Ok(_) => Availability::Available,
            Err(e) if e.kind() == ErrorKind::NotFound => Availability::ServiceMissing,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Availability::ServiceDisabled,
            Err(e) => Availability::Other(e.raw_os_error().unwrap_or(-1)),
        }
    }

    fn build_client(&self) -> Box<dyn ProviderClient> {
        Box::new(DeviceClient {
            device: self.device.clone(),
            events: self.events.clone(),
        })
    }
}

/// Client capability for the device backend. Each `connect()` spawns one
/// open attempt; the result is posted back to the coordinator queue.
pub struct DeviceClient {
    device: String,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl ProviderClient for DeviceClient {
    fn connect(&mut self) {
        let device = self.device.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            debug!("Provider: opening {device}");
            let event = match tokio::fs::File::open(&device).await {
                Ok(_) => {
                    info!("Provider: {device} opened, connected");
                    CoordinatorEvent::Connected
                }
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    warn!("Provider: {device} permission denied, resolvable");
                    CoordinatorEvent::ConnectionFailed(FailureInfo {
                        code: e.raw_os_error().unwrap_or(13),
                        resolvable: true,
                    })
                }
                Err(e) => {
                    warn!("Provider: failed to open {device}: {e}");
                    CoordinatorEvent::ConnectionFailed(FailureInfo {
                        code: e.raw_os_error().unwrap_or(-1),
                        resolvable: false,
                    })
                }
            };
            let _ = events.send(event);
        });
    }
}

/// Resolution launcher that runs the configured remediation command via
/// `sh -c`. The process exit status becomes the resolution outcome.
pub struct CommandResolution {
    command: Option<Arc<str>>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CommandResolution {
    #[must_use]
    pub fn new(command: Option<String>, events: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self {
            command: command.map(Arc::from),
            events,
        }
    }
}

impl ResolutionLauncher for CommandResolution {
    fn start_resolution(
        &mut self,
        failure: &FailureInfo,
        token: u32,
    ) -> Result<(), ResolutionLaunchError> {
        let Some(command) = self.command.clone() else {
            return Err(ResolutionLaunchError(
                "no resolution_command configured".to_string(),
            ));
        };

        info!(
            "Resolution: launching remediation for code {} (token {token})",
            failure.code
        );
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command.as_ref())
            .spawn()
            .map_err(|e| ResolutionLaunchError(e.to_string()))?;

        let events = self.events.clone();
        tokio::spawn(async move {
            let succeeded = match child.wait().await {
                Ok(status) => status.success(),
                Err(e) => {
                    warn!("Resolution: wait error: {e}");
                    false
                }
            };
            info!("Resolution: finished (token {token}, succeeded {succeeded})");
            let _ = events.send(CoordinatorEvent::ResolutionFinished { token, succeeded });
        });

        Ok(())
    }
}

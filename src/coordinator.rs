//! Connection coordinator — the state machine that owns the provider
//! connection attempt and translates its outcome into tracking start/stop
//! actions or reported error events.
//!
//! The coordinator is an explicit state machine with a single
//! [`ConnectionCoordinator::handle_event`] entry point. In production it is
//! driven by one tokio task consuming an unbounded mpsc queue
//! ([`spawn_coordinator`]), so events are totally ordered and never run
//! concurrently — provider callbacks and user actions land on the same queue.
//! Tests replay event sequences against the state machine directly.
//!
//! Errors never crash the process: they are emitted as [`ErrorEvent`] values
//! on a broadcast channel, and rendering them is the collaborator's job.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::provider::{Availability, FailureInfo, ProviderClient, ProviderFactory, ResolutionLauncher};
use crate::tracker::TrackingControl;

/// Fixed token identifying the coordinator's resolution flow. Outcomes
/// carrying any other token are ignored.
pub const RESOLUTION_TOKEN: u32 = 9999;

/// Connection lifecycle state, owned exclusively by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ResolvingError,
}

/// Everything the coordinator reacts to: user actions and provider callbacks
/// share one queue.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// User asked to start tracking.
    StartRequested,
    /// User asked to stop tracking.
    StopRequested,
    /// Provider connect attempt succeeded.
    Connected,
    /// Provider connection suspended; informational only.
    ConnectionSuspended,
    /// Provider connect attempt failed with an error descriptor.
    ConnectionFailed(FailureInfo),
    /// The interactive resolution flow completed.
    ResolutionFinished { token: u32, succeeded: bool },
}

/// A user-visible error, reported as a value. The collaborator decides how
/// to surface it (SSE event, log line, dialog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorEvent {
    /// Provider unavailable at client-creation time (service missing,
    /// outdated, or disabled) — a remediation prompt, not a fatal error.
    ProviderUnavailable { reason: Availability },
    /// Connect attempt failed with no interactive fix.
    ConnectionFatal { code: i32 },
}

/// Cloneable handle posting user actions onto the coordinator queue.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Request that tracking starts (connecting first if needed). Idempotent
    /// while a connect attempt is in flight.
    pub fn request_start(&self) {
        let _ = self.tx.send(CoordinatorEvent::StartRequested);
    }

    /// Request that tracking stops. Does not touch the connection.
    pub fn request_stop(&self) {
        let _ = self.tx.send(CoordinatorEvent::StopRequested);
    }

    /// Raw event sender for provider backends.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<CoordinatorEvent> {
        self.tx.clone()
    }
}

/// Create the coordinator event queue.
#[must_use]
pub fn coordinator_channel() -> (CoordinatorHandle, mpsc::UnboundedReceiver<CoordinatorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CoordinatorHandle { tx }, rx)
}

/// The connection/authorization state machine.
pub struct ConnectionCoordinator {
    state: ConnectionState,
    client: Option<Box<dyn ProviderClient>>,
    provider: Box<dyn ProviderFactory>,
    resolution: Box<dyn ResolutionLauncher>,
    tracking: Arc<dyn TrackingControl>,
    errors_tx: broadcast::Sender<ErrorEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionCoordinator {
    pub fn new(
        provider: Box<dyn ProviderFactory>,
        resolution: Box<dyn ResolutionLauncher>,
        tracking: Arc<dyn TrackingControl>,
        errors_tx: broadcast::Sender<ErrorEvent>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let _ = state_tx.send(ConnectionState::Disconnected);
        Self {
            state: ConnectionState::Disconnected,
            client: None,
            provider,
            resolution,
            tracking,
            errors_tx,
            state_tx,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Single entry point: apply one event to the state machine.
    pub fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::StartRequested => self.request_start(),
            CoordinatorEvent::StopRequested => {
                info!("Coordinator: stop requested");
                self.tracking.stop();
            }
            CoordinatorEvent::Connected => {
                info!("Coordinator: connected");
                self.set_state(ConnectionState::Connected);
                self.tracking.start();
            }
            CoordinatorEvent::ConnectionSuspended => {
                info!("Coordinator: connection suspended");
            }
            CoordinatorEvent::ConnectionFailed(info) => self.on_connection_failed(info),
            CoordinatorEvent::ResolutionFinished { token, succeeded } => {
                if token == RESOLUTION_TOKEN && succeeded {
                    info!("Coordinator: resolution succeeded, retrying start");
                    self.set_state(ConnectionState::Disconnected);
                    self.request_start();
                } else {
                    debug!("Coordinator: resolution cancelled or unknown token {token}, ignoring");
                }
            }
        }
    }

    fn request_start(&mut self) {
        if self.client.is_none() {
            match self.provider.check_availability() {
                Availability::Available => {
                    self.client = Some(self.provider.build_client());
                }
                reason @ (Availability::ServiceMissing
                | Availability::ServiceUpdateRequired
                | Availability::ServiceDisabled) => {
                    warn!("Coordinator: provider unavailable: {reason:?}");
                    let _ = self
                        .errors_tx
                        .send(ErrorEvent::ProviderUnavailable { reason });
                    return;
                }
                Availability::Other(code) => {
                    warn!("Coordinator: availability check returned {code}, ignoring start");
                    return;
                }
            }
        }

        match self.state {
            ConnectionState::Connected => {
                debug!("Coordinator: already connected, starting tracking directly");
                self.tracking.start();
            }
            ConnectionState::Connecting => {
                debug!("Coordinator: connect already in flight");
            }
            // A start from ResolvingError is the user retrying after
            // cancelling the resolution; issue a fresh attempt.
            ConnectionState::Disconnected | ConnectionState::ResolvingError => {
                self.set_state(ConnectionState::Connecting);
                if let Some(client) = self.client.as_mut() {
                    client.connect();
                }
            }
        }
    }

    fn on_connection_failed(&mut self, info: FailureInfo) {
        if info.resolvable {
            info!(
                "Coordinator: connect failed with resolvable code {}, launching resolution",
                info.code
            );
            self.set_state(ConnectionState::ResolvingError);
            if let Err(e) = self.resolution.start_resolution(&info, RESOLUTION_TOKEN) {
                // One immediate raw retry; a second failure re-enters this
                // classification.
                warn!("Coordinator: {e}, retrying raw connect");
                self.set_state(ConnectionState::Connecting);
                if let Some(client) = self.client.as_mut() {
                    client.connect();
                }
            }
        } else {
            warn!("Coordinator: connect failed fatally with code {}", info.code);
            self.set_state(ConnectionState::Disconnected);
            let _ = self
                .errors_tx
                .send(ErrorEvent::ConnectionFatal { code: info.code });
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Coordinator: {:?} -> {state:?}", self.state);
            self.state = state;
            let _ = self.state_tx.send(state);
        }
    }
}

/// Drive the coordinator from its event queue. Runs until all senders drop.
pub fn spawn_coordinator(
    mut coordinator: ConnectionCoordinator,
    mut rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            coordinator.handle_event(event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockClient {
        connects: Arc<AtomicUsize>,
    }

    impl ProviderClient for MockClient {
        fn connect(&mut self) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockFactory {
        availability: Availability,
        connects: Arc<AtomicUsize>,
        builds: Arc<AtomicUsize>,
    }

    impl ProviderFactory for MockFactory {
        fn check_availability(&self) -> Availability {
            self.availability
        }

        fn build_client(&self) -> Box<dyn ProviderClient> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Box::new(MockClient {
                connects: self.connects.clone(),
            })
        }
    }

    struct MockLauncher {
        fail_launch: bool,
        calls: Arc<Mutex<Vec<(i32, u32)>>>,
    }

    impl ResolutionLauncher for MockLauncher {
        fn start_resolution(
            &mut self,
            failure: &FailureInfo,
            token: u32,
        ) -> Result<(), crate::provider::ResolutionLaunchError> {
            self.calls.lock().unwrap().push((failure.code, token));
            if self.fail_launch {
                Err(crate::provider::ResolutionLaunchError("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MockTracking {
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockTracking {
        fn count(&self, which: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == which).count()
        }
    }

    impl TrackingControl for MockTracking {
        fn start(&self) {
            self.calls.lock().unwrap().push("start");
        }

        fn stop(&self) {
            self.calls.lock().unwrap().push("stop");
        }
    }

    struct Fixture {
        coordinator: ConnectionCoordinator,
        connects: Arc<AtomicUsize>,
        builds: Arc<AtomicUsize>,
        launcher_calls: Arc<Mutex<Vec<(i32, u32)>>>,
        tracking: Arc<MockTracking>,
        errors_rx: broadcast::Receiver<ErrorEvent>,
    }

    fn fixture(availability: Availability, fail_launch: bool) -> Fixture {
        let connects = Arc::new(AtomicUsize::new(0));
        let builds = Arc::new(AtomicUsize::new(0));
        let launcher_calls = Arc::new(Mutex::new(Vec::new()));
        let tracking = Arc::new(MockTracking::default());
        let (errors_tx, errors_rx) = broadcast::channel(16);
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);

        let coordinator = ConnectionCoordinator::new(
            Box::new(MockFactory {
                availability,
                connects: connects.clone(),
                builds: builds.clone(),
            }),
            Box::new(MockLauncher {
                fail_launch,
                calls: launcher_calls.clone(),
            }),
            tracking.clone(),
            errors_tx,
            state_tx,
        );

        Fixture {
            coordinator,
            connects,
            builds,
            launcher_calls,
            tracking,
            errors_rx,
        }
    }

    fn resolvable() -> FailureInfo {
        FailureInfo {
            code: 13,
            resolvable: true,
        }
    }

    fn fatal(code: i32) -> FailureInfo {
        FailureInfo {
            code,
            resolvable: false,
        }
    }

    #[test]
    fn test_start_while_connecting_is_idempotent() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);
        assert_eq!(f.connects.load(Ordering::SeqCst), 1);
        assert_eq!(f.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_when_connected_reissues_tracking_only() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator.handle_event(CoordinatorEvent::Connected);
        assert_eq!(f.tracking.count("start"), 1);

        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(f.tracking.count("start"), 2);
        // Still exactly one connect call issued overall
        assert_eq!(f.connects.load(Ordering::SeqCst), 1);
        assert_eq!(f.coordinator.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_connect_success_starts_tracking_once() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);
        f.coordinator.handle_event(CoordinatorEvent::Connected);
        assert_eq!(f.coordinator.state(), ConnectionState::Connected);
        assert_eq!(f.tracking.count("start"), 1);
        assert_eq!(f.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_service_missing_creates_no_client() {
        let mut f = fixture(Availability::ServiceMissing, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
        assert_eq!(f.builds.load(Ordering::SeqCst), 0);
        assert_eq!(f.connects.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.errors_rx.try_recv().unwrap(),
            ErrorEvent::ProviderUnavailable {
                reason: Availability::ServiceMissing
            }
        );
    }

    #[test]
    fn test_unknown_availability_is_silent_noop() {
        let mut f = fixture(Availability::Other(42), false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(f.builds.load(Ordering::SeqCst), 0);
        assert!(f.errors_rx.try_recv().is_err());
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_resolvable_failure_launches_resolution_not_fatal() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator
            .handle_event(CoordinatorEvent::ConnectionFailed(resolvable()));
        assert_eq!(f.coordinator.state(), ConnectionState::ResolvingError);
        assert_eq!(
            f.launcher_calls.lock().unwrap().as_slice(),
            &[(13, RESOLUTION_TOKEN)]
        );
        // Never emits the fatal event
        assert!(f.errors_rx.try_recv().is_err());
    }

    #[test]
    fn test_fatal_failure_reports_code_exactly_once() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator
            .handle_event(CoordinatorEvent::ConnectionFailed(fatal(6)));
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
        assert_eq!(
            f.errors_rx.try_recv().unwrap(),
            ErrorEvent::ConnectionFatal { code: 6 }
        );
        assert!(f.errors_rx.try_recv().is_err());
        assert!(f.launcher_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_resolution_launch_retries_connect_once() {
        let mut f = fixture(Availability::Available, true);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(f.connects.load(Ordering::SeqCst), 1);
        f.coordinator
            .handle_event(CoordinatorEvent::ConnectionFailed(resolvable()));
        // Exactly one raw retry, back to Connecting
        assert_eq!(f.connects.load(Ordering::SeqCst), 2);
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);
        assert!(f.errors_rx.try_recv().is_err());
    }

    #[test]
    fn test_resolution_success_retries_start() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator
            .handle_event(CoordinatorEvent::ConnectionFailed(resolvable()));
        f.coordinator.handle_event(CoordinatorEvent::ResolutionFinished {
            token: RESOLUTION_TOKEN,
            succeeded: true,
        });
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);
        assert_eq!(f.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolution_cancel_or_foreign_token_is_noop() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator
            .handle_event(CoordinatorEvent::ConnectionFailed(resolvable()));

        f.coordinator.handle_event(CoordinatorEvent::ResolutionFinished {
            token: RESOLUTION_TOKEN,
            succeeded: false,
        });
        assert_eq!(f.coordinator.state(), ConnectionState::ResolvingError);

        f.coordinator.handle_event(CoordinatorEvent::ResolutionFinished {
            token: 1234,
            succeeded: true,
        });
        assert_eq!(f.coordinator.state(), ConnectionState::ResolvingError);
        assert_eq!(f.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_after_cancelled_resolution_reconnects() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator
            .handle_event(CoordinatorEvent::ConnectionFailed(resolvable()));
        f.coordinator.handle_event(CoordinatorEvent::ResolutionFinished {
            token: RESOLUTION_TOKEN,
            succeeded: false,
        });
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);
        assert_eq!(f.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_leaves_connection_state_alone() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator.handle_event(CoordinatorEvent::StopRequested);
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);
        assert_eq!(f.tracking.count("stop"), 1);
        // Stop does not suppress the auto-start on a late Connected
        f.coordinator.handle_event(CoordinatorEvent::Connected);
        assert_eq!(f.tracking.count("start"), 1);
    }

    #[test]
    fn test_suspension_is_informational() {
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator.handle_event(CoordinatorEvent::Connected);
        f.coordinator
            .handle_event(CoordinatorEvent::ConnectionSuspended);
        assert_eq!(f.coordinator.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_frequency_change_stops_then_starts() {
        // The screen posts StopRequested then StartRequested after a tier
        // change; while connected that must hit the tracking controller as
        // stop then start, exactly once each.
        let mut f = fixture(Availability::Available, false);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        f.coordinator.handle_event(CoordinatorEvent::Connected);
        f.tracking.calls.lock().unwrap().clear();

        f.coordinator.handle_event(CoordinatorEvent::StopRequested);
        f.coordinator.handle_event(CoordinatorEvent::StartRequested);
        assert_eq!(
            f.tracking.calls.lock().unwrap().as_slice(),
            &["stop", "start"]
        );
    }
}

//! Presentation layer: the status "screen".
//!
//! [`ScreenController`] mirrors the original device UI — start/stop/clear
//! actions, a frequency selector, and a "last update" readout. While visible
//! it subscribes to the store's change feed and re-reads the last sample on
//! every notification (each change triggers its own refresh, no coalescing);
//! while hidden it is unsubscribed and the readout goes stale.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::coordinator::CoordinatorHandle;
use crate::settings::{FrequencyTier, SettingsStore};
use crate::store::LocationStore;
use crate::util::format_time;

pub struct ScreenController {
    store: Arc<LocationStore>,
    settings: SettingsStore,
    coordinator: CoordinatorHandle,
    last_update: Arc<RwLock<Option<String>>>,
    refresh_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ScreenController {
    pub fn new(
        store: Arc<LocationStore>,
        settings: SettingsStore,
        coordinator: CoordinatorHandle,
    ) -> Self {
        Self {
            store,
            settings,
            coordinator,
            last_update: Arc::new(RwLock::new(None)),
            refresh_task: StdMutex::new(None),
        }
    }

    /// Become visible: refresh immediately, then follow the change feed.
    pub async fn show(&self) {
        {
            // Check-and-spawn under one lock so concurrent show() calls
            // cannot each start a refresh loop.
            let mut task = self.refresh_task.lock().expect("refresh task lock");
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                return;
            }

            let mut feed = self.store.subscribe();
            let store = self.store.clone();
            let last_update = self.last_update.clone();
            *task = Some(tokio::spawn(async move {
                loop {
                    match feed.recv().await {
                        // A lagged receiver still re-reads current state
                        Ok(()) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                            refresh(&store, &last_update).await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        refresh(&self.store, &self.last_update).await;
        debug!("Screen: visible, following change feed");
    }

    /// Become hidden: unsubscribe from the change feed.
    pub fn hide(&self) {
        if let Some(task) = self.refresh_task.lock().expect("refresh task lock").take() {
            task.abort();
            debug!("Screen: hidden, change feed unsubscribed");
        }
    }

    /// Formatted timestamp of the last sample seen while visible.
    pub async fn last_update(&self) -> Option<String> {
        self.last_update.read().await.clone()
    }

    /// Start-tracking button.
    pub fn start_tracking(&self) {
        self.coordinator.request_start();
    }

    /// Stop-tracking button.
    pub fn stop_tracking(&self) {
        self.coordinator.request_stop();
    }

    /// Clear-data button: drops all stored samples.
    pub async fn clear_data(&self) {
        info!("Screen: clearing stored locations");
        self.store.clear().await;
    }

    /// Frequency selector: store the tier, then restart the tracking service
    /// (stop then start) so the new cadence takes effect.
    pub fn select_frequency(&self, tier: FrequencyTier) {
        info!("Screen: frequency set to {}", tier.as_str());
        self.settings.set(tier);
        self.coordinator.request_stop();
        self.coordinator.request_start();
    }

    /// Current frequency tier.
    #[must_use]
    pub fn frequency(&self) -> FrequencyTier {
        self.settings.get()
    }
}

async fn refresh(store: &LocationStore, last_update: &RwLock<Option<String>>) {
    let text = store.last().await.map(|s| format_time(s.recorded_at_ms));
    *last_update.write().await = text;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{coordinator_channel, CoordinatorEvent};
    use crate::store::LocationSample;

    fn sample(recorded_at_ms: u64) -> LocationSample {
        LocationSample {
            latitude: 45.502,
            longitude: -73.567,
            speed_kmh: 0.0,
            course: 0.0,
            recorded_at_ms,
        }
    }

    fn screen() -> (
        ScreenController,
        Arc<LocationStore>,
        SettingsStore,
        tokio::sync::mpsc::UnboundedReceiver<CoordinatorEvent>,
    ) {
        let store = Arc::new(LocationStore::new(16));
        let settings = SettingsStore::new(FrequencyTier::Medium);
        let (handle, rx) = coordinator_channel();
        let screen = ScreenController::new(store.clone(), settings.clone(), handle);
        (screen, store, settings, rx)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_frequency_change_posts_stop_then_start() {
        let (screen, _store, settings, mut rx) = screen();
        screen.select_frequency(FrequencyTier::High);

        assert_eq!(settings.get(), FrequencyTier::High);
        assert!(matches!(rx.try_recv().unwrap(), CoordinatorEvent::StopRequested));
        assert!(matches!(rx.try_recv().unwrap(), CoordinatorEvent::StartRequested));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_buttons_post_expected_events() {
        let (screen, _store, _settings, mut rx) = screen();
        screen.start_tracking();
        screen.stop_tracking();
        assert!(matches!(rx.try_recv().unwrap(), CoordinatorEvent::StartRequested));
        assert!(matches!(rx.try_recv().unwrap(), CoordinatorEvent::StopRequested));
    }

    #[tokio::test]
    async fn test_show_refreshes_on_feed_changes() {
        let (screen, store, _settings, _rx) = screen();
        store.push(sample(1_724_400_000_000)).await;

        screen.show().await;
        assert_eq!(
            screen.last_update().await.as_deref(),
            Some("2024-08-23 08:00:00 UTC")
        );

        store.push(sample(1_724_400_060_000)).await;
        settle().await;
        assert_eq!(
            screen.last_update().await.as_deref(),
            Some("2024-08-23 08:01:00 UTC")
        );
    }

    #[tokio::test]
    async fn test_concurrent_show_spawns_one_refresh_loop() {
        let (screen, store, _settings, _rx) = screen();
        let screen = Arc::new(screen);
        store.push(sample(1_724_400_000_000)).await;

        let a = screen.clone();
        let b = screen.clone();
        tokio::join!(a.show(), b.show());

        // One hide must tear down the only loop; a second leaked loop would
        // keep updating the readout after this.
        screen.hide();
        store.push(sample(1_724_400_060_000)).await;
        settle().await;
        assert_eq!(
            screen.last_update().await.as_deref(),
            Some("2024-08-23 08:00:00 UTC")
        );
    }

    #[tokio::test]
    async fn test_hidden_screen_goes_stale() {
        let (screen, store, _settings, _rx) = screen();
        store.push(sample(1_724_400_000_000)).await;
        screen.show().await;
        screen.hide();

        store.push(sample(1_724_400_060_000)).await;
        settle().await;
        // Still shows the value from before hide()
        assert_eq!(
            screen.last_update().await.as_deref(),
            Some("2024-08-23 08:00:00 UTC")
        );
    }

    #[tokio::test]
    async fn test_clear_data_empties_readout() {
        let (screen, store, _settings, _rx) = screen();
        store.push(sample(1_724_400_000_000)).await;
        screen.show().await;

        screen.clear_data().await;
        settle().await;
        assert_eq!(screen.last_update().await, None);
    }
}

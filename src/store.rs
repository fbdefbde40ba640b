//! In-memory location store with a change feed.
//!
//! [`LocationStore`] holds the last known sample plus a bounded history ring.
//! Every mutation (push, clear) sends one payload-free notification on the
//! change feed; observers must re-query. Notifications are not coalesced —
//! each change produces its own tick. Unsubscribing is dropping the receiver.
//!
//! Persistence across process restarts is intentionally out of scope; the
//! store lives for the lifetime of the process.

use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

/// A single location sample.
#[derive(Debug, Clone, Serialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Speed in km/h.
    pub speed_kmh: f64,
    /// Course over ground in degrees.
    pub course: f64,
    /// When this sample was recorded (epoch milliseconds).
    pub recorded_at_ms: u64,
}

struct Inner {
    last: Option<LocationSample>,
    history: VecDeque<LocationSample>,
    samples_total: u64,
    last_pushed_at: Option<Instant>,
}

/// Last-known sample + bounded history, with change notification.
pub struct LocationStore {
    inner: RwLock<Inner>,
    history_max: usize,
    feed_tx: broadcast::Sender<()>,
}

impl LocationStore {
    /// Create a store keeping at most `history_max` samples.
    #[must_use]
    pub fn new(history_max: usize) -> Self {
        let (feed_tx, _) = broadcast::channel(64);
        Self {
            inner: RwLock::new(Inner {
                last: None,
                history: VecDeque::with_capacity(history_max.min(256)),
                samples_total: 0,
                last_pushed_at: None,
            }),
            history_max,
            feed_tx,
        }
    }

    /// Append a sample, evicting the oldest if the ring is full, and notify
    /// the change feed.
    pub async fn push(&self, sample: LocationSample) {
        {
            let mut inner = self.inner.write().await;
            if inner.history.len() >= self.history_max {
                inner.history.pop_front();
            }
            inner.history.push_back(sample.clone());
            inner.last = Some(sample);
            inner.samples_total += 1;
            inner.last_pushed_at = Some(Instant::now());
        }
        let _ = self.feed_tx.send(());
    }

    /// Drop the last sample and all history, and notify the change feed.
    pub async fn clear(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.last = None;
            inner.history.clear();
            inner.last_pushed_at = None;
        }
        let _ = self.feed_tx.send(());
    }

    /// Last known sample, if any.
    pub async fn last(&self) -> Option<LocationSample> {
        self.inner.read().await.last.clone()
    }

    /// Seconds since the last sample was pushed.
    pub async fn last_age_secs(&self) -> Option<u64> {
        self.inner
            .read()
            .await
            .last_pushed_at
            .map(|t| t.elapsed().as_secs())
    }

    /// Most recent samples first, up to `limit`.
    pub async fn history(&self, limit: usize) -> Vec<LocationSample> {
        let inner = self.inner.read().await;
        inner.history.iter().rev().take(limit).cloned().collect()
    }

    /// Samples pushed since startup (clear does not reset this).
    pub async fn samples_total(&self) -> u64 {
        self.inner.read().await.samples_total
    }

    /// Subscribe to the change feed. Each mutation delivers one `()`;
    /// dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.feed_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lat: f64) -> LocationSample {
        LocationSample {
            latitude: lat,
            longitude: -73.567,
            speed_kmh: 0.0,
            course: 0.0,
            recorded_at_ms: 1_724_400_000_000,
        }
    }

    #[tokio::test]
    async fn test_push_updates_last() {
        let store = LocationStore::new(10);
        assert!(store.last().await.is_none());
        store.push(sample(45.1)).await;
        store.push(sample(45.2)).await;
        let last = store.last().await.unwrap();
        assert!((last.latitude - 45.2).abs() < f64::EPSILON);
        assert_eq!(store.samples_total().await, 2);
    }

    #[tokio::test]
    async fn test_history_evicts_oldest() {
        let store = LocationStore::new(3);
        for i in 0..5 {
            store.push(sample(f64::from(i))).await;
        }
        let history = store.history(10).await;
        assert_eq!(history.len(), 3);
        // Most recent first
        assert!((history[0].latitude - 4.0).abs() < f64::EPSILON);
        assert!((history[2].latitude - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let store = LocationStore::new(10);
        store.push(sample(45.0)).await;
        store.clear().await;
        assert!(store.last().await.is_none());
        assert!(store.history(10).await.is_empty());
        assert!(store.last_age_secs().await.is_none());
        // Lifetime counter survives a clear
        assert_eq!(store.samples_total().await, 1);
    }

    #[tokio::test]
    async fn test_feed_notifies_per_change() {
        let store = LocationStore::new(10);
        let mut rx = store.subscribe();
        store.push(sample(45.0)).await;
        store.push(sample(45.1)).await;
        store.clear().await;
        // One tick per mutation, no coalescing
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}

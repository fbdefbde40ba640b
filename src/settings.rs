//! Process-wide tracking frequency setting.
//!
//! [`SettingsStore`] is an explicit, cloneable handle around a tokio `watch`
//! channel: components that need the current [`FrequencyTier`] take a handle,
//! and components that care about changes subscribe instead of polling an
//! ambient global. Setting a new tier does not restart anything by itself —
//! the caller owns the stop-then-start sequencing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Coarse setting controlling how often location samples are requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyTier {
    High,
    #[default]
    Medium,
    Low,
}

impl FrequencyTier {
    /// Parse from the serde rename value (e.g. `"high"`).
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Cloneable handle to the current frequency tier.
#[derive(Clone)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<FrequencyTier>>,
}

impl SettingsStore {
    /// Create a store holding `initial`.
    #[must_use]
    pub fn new(initial: FrequencyTier) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Current tier.
    #[must_use]
    pub fn get(&self) -> FrequencyTier {
        *self.tx.borrow()
    }

    /// Overwrite the tier. Subscribers are notified even if the value is
    /// unchanged (a re-selection still counts as a change for observers).
    pub fn set(&self, tier: FrequencyTier) {
        self.tx.send_replace(tier);
    }

    /// Subscribe to tier changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FrequencyTier> {
        self.tx.subscribe()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(FrequencyTier::default())
    }
}

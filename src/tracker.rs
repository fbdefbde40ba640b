//! Background tracking service: a single sampling task reading the location
//! source at the configured cadence and pushing samples into the store.
//!
//! [`TrackingServiceController`] owns at most one task. `start()` while the
//! task is alive is a no-op, `stop()` when idle is a no-op — restart
//! semantics (e.g. after a frequency change) are the caller's concern.
//!
//! The production source reads NMEA `RMC` sentences from the GNSS device.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::settings::SettingsStore;
use crate::store::{LocationSample, LocationStore};
use crate::util::now_epoch_ms;

/// Start/stop surface the coordinator drives. Object-safe and synchronous;
/// both operations are idempotent.
pub trait TrackingControl: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Produces one location sample per call. `Err("searching")` means the
/// source is alive but has no fix yet.
pub trait LocationSource: Send + Sync + 'static {
    fn sample(&self) -> impl Future<Output = Result<LocationSample, String>> + Send;
}

/// Starts and stops the one background tracking task.
pub struct TrackingServiceController<S: LocationSource> {
    source: Arc<S>,
    store: Arc<LocationStore>,
    settings: SettingsStore,
    tracking: TrackingConfig,
    events: broadcast::Sender<Value>,
    task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<S: LocationSource> TrackingServiceController<S> {
    pub fn new(
        source: Arc<S>,
        store: Arc<LocationStore>,
        settings: SettingsStore,
        tracking: TrackingConfig,
        events: broadcast::Sender<Value>,
    ) -> Self {
        Self {
            source,
            store,
            settings,
            tracking,
            events,
            task: StdMutex::new(None),
        }
    }

    /// Whether the tracking task is currently alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("tracking task lock")
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl<S: LocationSource> TrackingControl for TrackingServiceController<S> {
    fn start(&self) {
        let mut task = self.task.lock().expect("tracking task lock");
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Tracking: already running, start is a no-op");
            return;
        }

        let tier = self.settings.get();
        let interval = Duration::from_secs(self.tracking.interval_secs(tier));
        let timeout = Duration::from_secs(self.tracking.sample_timeout_secs);
        info!(
            "Tracking: starting sampler (tier {}, every {}s)",
            tier.as_str(),
            interval.as_secs()
        );

        *task = Some(tokio::spawn(run_sampler(
            self.source.clone(),
            self.store.clone(),
            self.events.clone(),
            interval,
            timeout,
        )));
    }

    fn stop(&self) {
        let mut task = self.task.lock().expect("tracking task lock");
        if let Some(t) = task.take() {
            t.abort();
            info!("Tracking: sampler stopped");
        } else {
            debug!("Tracking: not running, stop is a no-op");
        }
    }
}

/// The sampling loop: tick, sample (with timeout), store, broadcast.
async fn run_sampler<S: LocationSource>(
    source: Arc<S>,
    store: Arc<LocationStore>,
    events: broadcast::Sender<Value>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match tokio::time::timeout(timeout, source.sample()).await {
            Ok(Ok(sample)) => {
                debug!(
                    "Tracking: sample {:.6},{:.6} speed={:.1}km/h",
                    sample.latitude, sample.longitude, sample.speed_kmh
                );
                let _ = events.send(json!({
                    "type": "location.updated",
                    "latitude": sample.latitude,
                    "longitude": sample.longitude,
                    "speed_kmh": sample.speed_kmh,
                    "recorded_at_ms": sample.recorded_at_ms,
                }));
                store.push(sample).await;
            }
            Ok(Err(ref e)) if e == "searching" => {
                debug!("Tracking: searching for fix...");
            }
            Ok(Err(e)) => {
                warn!("Tracking: sample error: {e}");
            }
            Err(_) => {
                warn!("Tracking: sample timed out after {}s", timeout.as_secs());
            }
        }
    }
}

// ── NMEA RMC source ──────────────────────────────────────────────────

/// Location source reading NMEA `RMC` sentences from a GNSS device node.
pub struct NmeaDeviceSource {
    device: String,
}

impl NmeaDeviceSource {
    #[must_use]
    pub fn new(device: String) -> Self {
        Self { device }
    }
}

/// Lines scanned per sample before giving up. GNSS receivers interleave RMC
/// with other sentence types, typically one RMC per cycle of ~6 sentences.
const MAX_SCAN_LINES: usize = 32;

impl LocationSource for NmeaDeviceSource {
    async fn sample(&self) -> Result<LocationSample, String> {
        let file = tokio::fs::File::open(&self.device)
            .await
            .map_err(|e| format!("open {}: {e}", self.device))?;
        let mut lines = BufReader::new(file).lines();

        let mut searching = false;
        for _ in 0..MAX_SCAN_LINES {
            let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
                break;
            };
            if !line.contains("RMC") {
                continue;
            }
            match parse_rmc(&line, now_epoch_ms()) {
                Ok(sample) => return Ok(sample),
                Err(ref e) if e == "searching" => searching = true,
                Err(e) => debug!("Tracking: skipping bad RMC line: {e}"),
            }
        }

        if searching {
            Err("searching".to_string())
        } else {
            Err("no RMC sentence in device output".to_string())
        }
    }
}

/// Parse an NMEA `RMC` sentence (any talker: `$GPRMC`, `$GNRMC`, ...).
///
/// ```text
/// $GPRMC,<utc>,<status>,<lat>,<N|S>,<lon>,<E|W>,<knots>,<course>,<date>,...*<cksum>
/// ```
///
/// Returns `Ok(LocationSample)` for an active fix, `Err("searching")` for a
/// void fix (status `V`), or `Err(description)` for malformed input.
pub fn parse_rmc(line: &str, recorded_at_ms: u64) -> Result<LocationSample, String> {
    let line = line.trim();
    let body = line
        .strip_prefix('$')
        .ok_or_else(|| format!("not an NMEA sentence: {line}"))?;

    // Verify the checksum when present
    let payload = if let Some((payload, checksum)) = body.rsplit_once('*') {
        let expected = u8::from_str_radix(checksum.trim(), 16)
            .map_err(|e| format!("bad checksum field: {e}"))?;
        let actual = payload.bytes().fold(0u8, |acc, b| acc ^ b);
        if actual != expected {
            return Err(format!(
                "checksum mismatch: computed {actual:02X}, sentence says {expected:02X}"
            ));
        }
        payload
    } else {
        body
    };

    let parts: Vec<&str> = payload.split(',').collect();
    if !parts[0].ends_with("RMC") {
        return Err(format!("not an RMC sentence: {}", parts[0]));
    }
    if parts.len() < 10 {
        return Err(format!("expected at least 10 RMC fields, got {}", parts.len()));
    }

    if parts[2] != "A" {
        return Err("searching".to_string());
    }

    let latitude = parse_coordinate(parts[3], parts[4], 2)?;
    let longitude = parse_coordinate(parts[5], parts[6], 3)?;

    let knots: f64 = if parts[7].is_empty() {
        0.0
    } else {
        parts[7].parse().map_err(|e| format!("bad speed: {e}"))?
    };
    let course: f64 = if parts[8].is_empty() {
        0.0
    } else {
        parts[8].parse().map_err(|e| format!("bad course: {e}"))?
    };

    Ok(LocationSample {
        latitude,
        longitude,
        speed_kmh: knots * 1.852,
        course,
        recorded_at_ms,
    })
}

/// Convert an NMEA `(d)ddmm.mmmm` coordinate plus hemisphere to decimal
/// degrees. Latitude uses 2 degree digits, longitude 3.
fn parse_coordinate(value: &str, hemisphere: &str, degree_digits: usize) -> Result<f64, String> {
    // Slicing below is byte-indexed; a multibyte character at the split
    // point must be rejected, not panic the sampler.
    if value.len() <= degree_digits || !value.is_char_boundary(degree_digits) {
        return Err(format!("malformed coordinate: {value:?}"));
    }
    let degrees: f64 = value[..degree_digits]
        .parse()
        .map_err(|e| format!("bad degrees: {e}"))?;
    let minutes: f64 = value[degree_digits..]
        .parse()
        .map_err(|e| format!("bad minutes: {e}"))?;
    let decimal = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Ok(decimal),
        "S" | "W" => Ok(-decimal),
        other => Err(format!("bad hemisphere: {other:?}")),
    }
}

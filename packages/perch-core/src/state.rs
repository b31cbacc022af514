//! Core application state types.
//!
//! This module provides the supervisor [`Config`], the shared
//! [`IdentityHandle`] holding the appliance's claim on a playback endpoint,
//! and the persisted [`CredentialStore`].

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONNECTIVITY_PROBE_ADDR, CONNECTIVITY_TIMEOUT_SECS, DEFAULT_BIND_PORT, DEFAULT_DEVICE_NAME,
    DEFAULT_VOLUME, HEALTH_INTERVAL_SECS, HEALTH_RETRY_SECS, LOG_RETENTION_DAYS,
    MAX_RECOVERY_ATTEMPTS, OWNERSHIP_INTERVAL_SECS, RECONCILE_BACKOFF_SECS,
    RECONCILE_INTERVAL_SECS, RECOVERY_RESET_THRESHOLD, RESOURCE_THRESHOLD_PCT,
};
use crate::spotify::{Credentials, TrackInfo};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the health monitor.
///
/// Groups the check thresholds and cadences so deployments can tune them
/// without touching the watchdog cadences.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between health check cycles (seconds).
    pub interval_secs: u64,

    /// Shortened interval after a cycle error (seconds).
    pub retry_secs: u64,

    /// CPU utilization percentage above which the check fails.
    pub cpu_threshold_pct: f32,

    /// Memory utilization percentage above which the check fails.
    pub memory_threshold_pct: f32,

    /// Disk utilization percentage above which the check fails.
    pub disk_threshold_pct: f32,

    /// Endpoint probed to verify network reachability.
    pub probe_addr: String,

    /// Timeout for the connectivity probe (seconds).
    pub probe_timeout_secs: u64,

    /// Journal and cache entries older than this many days are purged by
    /// the disk cleanup action.
    pub log_retention_days: u32,

    /// Directory scanned for stale cache files during disk cleanup.
    pub cache_dir: PathBuf,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: HEALTH_INTERVAL_SECS,
            retry_secs: HEALTH_RETRY_SECS,
            cpu_threshold_pct: RESOURCE_THRESHOLD_PCT,
            memory_threshold_pct: RESOURCE_THRESHOLD_PCT,
            disk_threshold_pct: RESOURCE_THRESHOLD_PCT,
            probe_addr: CONNECTIVITY_PROBE_ADDR.to_string(),
            probe_timeout_secs: CONNECTIVITY_TIMEOUT_SECS,
            log_retention_days: LOG_RETENTION_DAYS,
            cache_dir: PathBuf::from("/var/cache/perch"),
        }
    }
}

/// Configuration for the Perch supervisor.
///
/// All fields have sensible defaults for a Raspberry Pi appliance.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Device name the appliance advertises to Spotify Connect.
    pub device_name: String,

    /// Port for the HTTP control panel.
    pub bind_port: u16,

    /// Volume applied to the mixer at startup (percent).
    pub default_volume: u8,

    /// Write an ALSA downmix config routing both channels to one output.
    pub force_mono: bool,

    /// Directory for persistent data (Spotify credentials).
    pub data_dir: Option<PathBuf>,

    /// Interval between playback reconciliation cycles (seconds).
    pub reconcile_interval_secs: u64,

    /// Backoff after a failed reconciliation cycle (seconds).
    pub reconcile_backoff_secs: u64,

    /// Interval between device ownership checks (seconds).
    pub ownership_interval_secs: u64,

    /// Wireless interface cycled by network recovery.
    pub wireless_interface: String,

    /// Consecutive failures after which a subsystem's recovery action is
    /// skipped.
    pub max_recovery_attempts: u32,

    /// Consecutive failures after which the attempt counter resets,
    /// opening a fresh escalation window.
    pub recovery_reset_threshold: u32,

    /// Health monitor configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            bind_port: DEFAULT_BIND_PORT,
            default_volume: DEFAULT_VOLUME,
            force_mono: false,
            data_dir: None,
            reconcile_interval_secs: RECONCILE_INTERVAL_SECS,
            reconcile_backoff_secs: RECONCILE_BACKOFF_SECS,
            ownership_interval_secs: OWNERSHIP_INTERVAL_SECS,
            wireless_interface: "wlan0".to_string(),
            max_recovery_attempts: MAX_RECOVERY_ATTEMPTS,
            recovery_reset_threshold: RECOVERY_RESET_THRESHOLD,
            health: HealthConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.device_name.is_empty() {
            return Err("device_name must not be empty".to_string());
        }
        if self.default_volume > 100 {
            return Err("default_volume must be 0-100".to_string());
        }
        if self.reconcile_interval_secs == 0 || self.ownership_interval_secs == 0 {
            return Err("watchdog intervals must be >= 1 second".to_string());
        }
        if self.health.interval_secs == 0 || self.health.retry_secs == 0 {
            return Err("health intervals must be >= 1 second".to_string());
        }
        if self.max_recovery_attempts == 0 {
            return Err("max_recovery_attempts must be >= 1".to_string());
        }
        if self.recovery_reset_threshold <= self.max_recovery_attempts {
            return Err(
                "recovery_reset_threshold must be greater than max_recovery_attempts".to_string(),
            );
        }
        for (name, pct) in [
            ("cpu_threshold_pct", self.health.cpu_threshold_pct),
            ("memory_threshold_pct", self.health.memory_threshold_pct),
            ("disk_threshold_pct", self.health.disk_threshold_pct),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(format!("{} must be within 0-100", name));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Appliance Identity
// ─────────────────────────────────────────────────────────────────────────────

/// The appliance's claim on a playback endpoint.
///
/// `device_id` is discovered lazily from the backend's device list and may be
/// rediscovered whenever the session is re-established. `is_playing` is the
/// last-known local belief, reconciled against backend truth by the watchdog
/// loops; it is never authoritative.
#[derive(Debug, Clone, Default)]
pub struct ApplianceIdentity {
    /// Backend device id, `None` until discovered.
    pub device_id: Option<String>,
    /// Last-known local belief about playback state.
    pub is_playing: bool,
    /// Last track reported by the backend, for the control panel.
    pub current_track: Option<TrackInfo>,
}

/// Shared, lock-guarded handle to the appliance identity.
///
/// All mutation goes through these accessors; holding the write lock across
/// the whole update keeps `is_playing == true` implying a known `device_id`.
#[derive(Clone, Default)]
pub struct IdentityHandle {
    inner: Arc<RwLock<ApplianceIdentity>>,
}

impl IdentityHandle {
    /// Creates an empty identity (no device claimed, not playing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the claimed device id, if any.
    pub fn device_id(&self) -> Option<String> {
        self.inner.read().device_id.clone()
    }

    /// Returns the local playback belief.
    pub fn is_playing(&self) -> bool {
        self.inner.read().is_playing
    }

    /// Returns the last track reported by the backend.
    pub fn current_track(&self) -> Option<TrackInfo> {
        self.inner.read().current_track.clone()
    }

    /// Records the discovered device id.
    pub fn claim_device(&self, device_id: String) {
        let mut identity = self.inner.write();
        log::info!("[Identity] Claimed device id {}", device_id);
        identity.device_id = Some(device_id);
    }

    /// Marks playback as running.
    ///
    /// Returns `false` (and changes nothing) when no device has been claimed:
    /// a playing belief without an endpoint would be meaningless.
    pub fn mark_playing(&self) -> bool {
        let mut identity = self.inner.write();
        if identity.device_id.is_none() {
            log::warn!("[Identity] Refusing to mark playing without a claimed device");
            return false;
        }
        identity.is_playing = true;
        true
    }

    /// Clears the playback belief.
    pub fn clear_playing(&self) {
        self.inner.write().is_playing = false;
    }

    /// Reconciles the playback belief against a backend report.
    pub fn sync_playing(&self, backend_playing: bool) {
        if backend_playing {
            self.mark_playing();
        } else {
            self.clear_playing();
        }
    }

    /// Updates the last-seen track.
    pub fn set_current_track(&self, track: Option<TrackInfo>) {
        self.inner.write().current_track = track;
    }

    /// Clears everything, forcing rediscovery on the next reconcile cycle.
    pub fn reset(&self) {
        let mut identity = self.inner.write();
        *identity = ApplianceIdentity::default();
        log::info!("[Identity] Reset; device will be rediscovered");
    }

    /// Returns a consistent copy of the identity.
    pub fn snapshot(&self) -> ApplianceIdentity {
        self.inner.read().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential Persistence
// ─────────────────────────────────────────────────────────────────────────────

const CREDENTIALS_FILE: &str = "credentials.json";

/// Global mutex serializing credential file operations, preventing races
/// between concurrent setup requests.
static STORE_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn store_lock() -> &'static Mutex<()> {
    STORE_LOCK.get_or_init(|| Mutex::new(()))
}

/// Persisted Spotify credentials in the data directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    data_dir: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at the given data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE)
    }

    /// Loads credentials, returning defaults if the file is missing or
    /// invalid.
    pub fn load(&self) -> Credentials {
        match std::fs::read_to_string(self.path()) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Credentials::default(),
        }
    }

    /// Saves credentials atomically (temp file + rename) under the store
    /// lock. Creates the directory if it doesn't exist.
    pub fn save(&self, credentials: &Credentials) -> std::io::Result<()> {
        let _guard = store_lock().lock();
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.path();
        let temp_path = self.data_dir.join("credentials.json.tmp");
        let contents = serde_json::to_string_pretty(credentials)?;

        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)
    }
}

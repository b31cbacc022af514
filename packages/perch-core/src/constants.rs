//! Fixed operational constants.
//!
//! Cadences, thresholds, and endpoints that define the supervisor's behavior.
//! Values that deployments may legitimately need to change are mirrored as
//! defaults in [`Config`](crate::state::Config); the rest live only here.

// ─────────────────────────────────────────────────────────────────────────────
// Appliance Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Device name the appliance advertises to Spotify Connect.
///
/// Session establishment selects the device whose advertised name matches
/// this exactly, so it must agree with the librespot/raspotify unit config.
pub const DEFAULT_DEVICE_NAME: &str = "Spotify Appliance";

/// Service identifier reported by the `/health` endpoint.
pub const SERVICE_ID: &str = "perch";

// ─────────────────────────────────────────────────────────────────────────────
// Spotify Web API
// ─────────────────────────────────────────────────────────────────────────────

/// Base URL for the Spotify Web API.
pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com";

/// OAuth token endpoint for the Spotify accounts service.
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Timeout for Spotify Web API requests (seconds).
///
/// Every backend call must be bounded so a wedged connection cannot stall a
/// watchdog loop past its own cadence.
pub const HTTP_TIMEOUT_SECS: u64 = 5;

/// Seconds subtracted from a token's reported lifetime before it is treated
/// as expired, covering clock skew and request latency.
pub const TOKEN_EXPIRY_MARGIN_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Watchdog Cadences
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between playback reconciliation cycles (seconds).
pub const RECONCILE_INTERVAL_SECS: u64 = 1;

/// Backoff after a failed reconciliation cycle (seconds).
///
/// Longer than the normal cadence to bound retry storms against a flaky
/// backend without ever giving up.
pub const RECONCILE_BACKOFF_SECS: u64 = 5;

/// Interval between device ownership checks (seconds).
pub const OWNERSHIP_INTERVAL_SECS: u64 = 5;

/// Interval between health check cycles (seconds).
pub const HEALTH_INTERVAL_SECS: u64 = 60;

/// Shortened interval after a health cycle error (seconds).
pub const HEALTH_RETRY_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Health Checks & Recovery
// ─────────────────────────────────────────────────────────────────────────────

/// Public endpoint used to verify network reachability (DNS over TCP).
pub const CONNECTIVITY_PROBE_ADDR: &str = "8.8.8.8:53";

/// Timeout for the connectivity probe (seconds).
pub const CONNECTIVITY_TIMEOUT_SECS: u64 = 3;

/// Utilization percentage above which a resource check fails.
pub const RESOURCE_THRESHOLD_PCT: f32 = 80.0;

/// Journal and cache entries older than this many days are purged by the
/// disk cleanup action.
pub const LOG_RETENTION_DAYS: u32 = 7;

/// Consecutive failures after which a subsystem's recovery action is no
/// longer run.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Consecutive failures after which the attempt counter resets to zero,
/// opening a fresh escalation window.
pub const RECOVERY_RESET_THRESHOLD: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Control Panel
// ─────────────────────────────────────────────────────────────────────────────

/// Default port for the HTTP control panel.
pub const DEFAULT_BIND_PORT: u16 = 5000;

/// Volume applied to the mixer at startup (percent).
pub const DEFAULT_VOLUME: u8 = 70;

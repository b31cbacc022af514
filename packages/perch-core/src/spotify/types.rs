//! Domain types for the Spotify backend.

use serde::{Deserialize, Serialize};

/// A playback device known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Backend-assigned device id.
    pub id: String,
    /// Human-readable device name as advertised to Spotify Connect.
    pub name: String,
    /// Whether the backend currently routes playback to this device.
    pub is_active: bool,
}

/// Track metadata for display on the control panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Track title.
    pub title: String,
    /// Primary artist names, joined for display.
    pub artist: String,
    /// Spotify track URI.
    pub uri: String,
}

/// Snapshot of the backend's current playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPlayback {
    /// Device the backend reports as active.
    pub device: Device,
    /// Whether the backend reports playback as running (vs. paused).
    pub is_playing: bool,
    /// Currently loaded track, if any.
    pub track: Option<TrackInfo>,
}

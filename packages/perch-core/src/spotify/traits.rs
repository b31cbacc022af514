//! Trait abstractions for Spotify operations.
//!
//! These traits enable dependency injection for testability. Services depend
//! on them rather than on the concrete client.

use async_trait::async_trait;

use crate::spotify::auth::Credentials;
use crate::spotify::error::SpotifyResult;
use crate::spotify::types::{CurrentPlayback, Device};

/// Device enumeration.
///
/// Used during session establishment to find the appliance's own endpoint in
/// the backend's device list.
#[async_trait]
pub trait SpotifyDevices: Send + Sync {
    /// Lists the playback devices currently known to the backend.
    async fn list_devices(&self) -> SpotifyResult<Vec<Device>>;
}

/// Playback state and transport control.
#[async_trait]
pub trait SpotifyPlayback: Send + Sync {
    /// Returns the backend's current playback session, or `None` when no
    /// session is active anywhere.
    async fn current_playback(&self) -> SpotifyResult<Option<CurrentPlayback>>;

    /// Starts or resumes playback on the given device.
    async fn start_playback(&self, device_id: &str) -> SpotifyResult<()>;

    /// Transfers the active playback session to the given device.
    ///
    /// With `force_play` set, playback starts immediately on the target even
    /// if the session was paused. Transferring to the already-active device
    /// is a harmless no-op on the backend side.
    async fn transfer_playback(&self, device_id: &str, force_play: bool) -> SpotifyResult<()>;
}

/// Session credential management.
#[async_trait]
pub trait SpotifySession: Send + Sync {
    /// Replaces the credentials, invalidating any cached token.
    fn set_credentials(&self, credentials: Credentials);

    /// Verifies that a bearer token can be obtained with the current
    /// credentials.
    async fn authenticate(&self) -> SpotifyResult<()>;
}

/// Combined trait for all Spotify operations.
#[async_trait]
pub trait SpotifyClient: SpotifyDevices + SpotifyPlayback + SpotifySession {}

/// Blanket implementation for any type implementing all traits.
impl<T: SpotifyDevices + SpotifyPlayback + SpotifySession> SpotifyClient for T {}

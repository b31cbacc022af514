//! Spotify Web API client.
//!
//! Wraps the player endpoints the supervisor needs, with retry logic for
//! transient failures (rate limiting, 5xx, timeouts) so a single flaky
//! request does not fail a whole watchdog cycle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::constants::SPOTIFY_API_BASE;
use crate::spotify::auth::{Credentials, TokenManager};
use crate::spotify::error::{SpotifyError, SpotifyResult};
use crate::spotify::traits::{SpotifyDevices, SpotifyPlayback, SpotifySession};
use crate::spotify::types::{CurrentPlayback, Device, TrackInfo};

/// Retry delays for transient API errors (exponential backoff).
const RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Executes an API request with retry logic for transient errors.
///
/// Retries on rate limiting, 5xx responses and timeouts with exponential
/// backoff (200ms, 500ms, 1000ms). Non-transient errors return immediately.
async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> SpotifyResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = SpotifyResult<T>>,
{
    let mut last_error = None;
    for (attempt, &delay_ms) in std::iter::once(&0)
        .chain(RETRY_DELAYS_MS.iter())
        .enumerate()
    {
        if attempt > 0 {
            log::info!(
                "[Spotify] Retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                RETRY_DELAYS_MS.len() + 1,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[Spotify] {} transient error: {}", action, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.expect("retry loop should have set last_error"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DevicesResponse {
    devices: Vec<ApiDevice>,
}

#[derive(Deserialize)]
struct ApiDevice {
    /// `null` for restricted devices that cannot be addressed.
    id: Option<String>,
    name: String,
    #[serde(default)]
    is_active: bool,
}

#[derive(Deserialize)]
struct PlayerResponse {
    device: ApiDevice,
    #[serde(default)]
    is_playing: bool,
    item: Option<ApiTrack>,
}

#[derive(Deserialize)]
struct ApiTrack {
    name: String,
    uri: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

#[derive(Deserialize)]
struct ApiArtist {
    name: String,
}

impl From<ApiTrack> for TrackInfo {
    fn from(track: ApiTrack) -> Self {
        let artist = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            title: track.name,
            artist,
            uri: track.uri,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Concrete Spotify Web API client.
pub struct SpotifyClientImpl {
    http: Client,
    auth: TokenManager,
    api_base: String,
}

impl SpotifyClientImpl {
    /// Creates a new client sharing the given HTTP connection pool.
    pub fn new(http: Client, credentials: Credentials) -> Self {
        Self {
            auth: TokenManager::new(http.clone(), credentials),
            http,
            api_base: SPOTIFY_API_BASE.to_string(),
        }
    }

    /// Sends an authenticated request and normalizes error statuses.
    ///
    /// A 401 drops the cached token before surfacing, so the next request
    /// re-authenticates instead of replaying a dead token.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> SpotifyResult<reqwest::Response> {
        let token = self.auth.bearer().await?;
        let url = format!("{}{}", self.api_base, path);

        let mut request = self.http.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
            return Err(SpotifyError::Auth("API rejected access token".into()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SpotifyError::RateLimited);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SpotifyError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn list_devices_once(&self) -> SpotifyResult<Vec<Device>> {
        let response = self.send(Method::GET, "/v1/me/player/devices", None).await?;
        let parsed: DevicesResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Parse(format!("device list: {}", e)))?;

        // Restricted devices advertise without an id and cannot be targeted.
        let devices = parsed
            .devices
            .into_iter()
            .filter_map(|d| {
                d.id.map(|id| Device {
                    id,
                    name: d.name,
                    is_active: d.is_active,
                })
            })
            .collect();
        Ok(devices)
    }

    async fn current_playback_once(&self) -> SpotifyResult<Option<CurrentPlayback>> {
        let response = self.send(Method::GET, "/v1/me/player", None).await?;

        // 204 means no session is active anywhere.
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let parsed: PlayerResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Parse(format!("player state: {}", e)))?;

        let Some(device_id) = parsed.device.id else {
            return Ok(None);
        };
        Ok(Some(CurrentPlayback {
            device: Device {
                id: device_id,
                name: parsed.device.name,
                is_active: parsed.device.is_active,
            },
            is_playing: parsed.is_playing,
            track: parsed.item.map(TrackInfo::from),
        }))
    }

    async fn start_playback_once(&self, device_id: &str) -> SpotifyResult<()> {
        let path = format!("/v1/me/player/play?device_id={}", device_id);
        self.send(Method::PUT, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn transfer_playback_once(&self, device_id: &str, force_play: bool) -> SpotifyResult<()> {
        let body = json!({
            "device_ids": [device_id],
            "play": force_play,
        });
        self.send(Method::PUT, "/v1/me/player", Some(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl SpotifyDevices for SpotifyClientImpl {
    async fn list_devices(&self) -> SpotifyResult<Vec<Device>> {
        with_retry("ListDevices", || self.list_devices_once()).await
    }
}

#[async_trait]
impl SpotifyPlayback for SpotifyClientImpl {
    async fn current_playback(&self) -> SpotifyResult<Option<CurrentPlayback>> {
        with_retry("CurrentPlayback", || self.current_playback_once()).await
    }

    async fn start_playback(&self, device_id: &str) -> SpotifyResult<()> {
        log::info!("[Spotify] Starting playback on device {}", device_id);
        with_retry("StartPlayback", || self.start_playback_once(device_id)).await
    }

    async fn transfer_playback(&self, device_id: &str, force_play: bool) -> SpotifyResult<()> {
        log::info!(
            "[Spotify] Transferring playback to device {} (force_play={})",
            device_id,
            force_play
        );
        with_retry("TransferPlayback", || {
            self.transfer_playback_once(device_id, force_play)
        })
        .await
    }
}

#[async_trait]
impl SpotifySession for SpotifyClientImpl {
    fn set_credentials(&self, credentials: Credentials) {
        self.auth.set_credentials(credentials);
    }

    async fn authenticate(&self) -> SpotifyResult<()> {
        self.auth.bearer().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_list_skips_restricted_devices() {
        let payload = r#"{
            "devices": [
                {"id": "abc123", "name": "Spotify Appliance", "is_active": true},
                {"id": null, "name": "Restricted Speaker", "is_active": false}
            ]
        }"#;
        let parsed: DevicesResponse = serde_json::from_str(payload).unwrap();
        let devices: Vec<Device> = parsed
            .devices
            .into_iter()
            .filter_map(|d| {
                d.id.map(|id| Device {
                    id,
                    name: d.name,
                    is_active: d.is_active,
                })
            })
            .collect();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "abc123");
        assert!(devices[0].is_active);
    }

    #[test]
    fn player_state_parses_track_and_artists() {
        let payload = r#"{
            "device": {"id": "abc123", "name": "Kitchen", "is_active": true},
            "is_playing": true,
            "item": {
                "name": "So What",
                "uri": "spotify:track:xyz",
                "artists": [{"name": "Miles Davis"}, {"name": "John Coltrane"}]
            }
        }"#;
        let parsed: PlayerResponse = serde_json::from_str(payload).unwrap();
        assert!(parsed.is_playing);

        let track = TrackInfo::from(parsed.item.unwrap());
        assert_eq!(track.title, "So What");
        assert_eq!(track.artist, "Miles Davis, John Coltrane");
        assert_eq!(track.uri, "spotify:track:xyz");
    }

    #[test]
    fn player_state_tolerates_missing_item() {
        let payload = r#"{
            "device": {"id": "abc123", "name": "Kitchen", "is_active": true},
            "is_playing": false
        }"#;
        let parsed: PlayerResponse = serde_json::from_str(payload).unwrap();
        assert!(parsed.item.is_none());
        assert!(!parsed.is_playing);
    }
}

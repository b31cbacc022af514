//! OAuth token management for the Spotify accounts service.
//!
//! Holds the appliance credentials and a cached bearer token. The token is
//! fetched lazily, reused until shortly before expiry, and dropped on a 401
//! so the next request re-authenticates.

use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{SPOTIFY_TOKEN_URL, TOKEN_EXPIRY_MARGIN_SECS};
use crate::spotify::error::{SpotifyError, SpotifyResult};

/// Appliance credentials for the Spotify accounts service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived refresh token granting the playback scopes.
    ///
    /// Obtained once through the initial device authorization; without it the
    /// token endpoint falls back to the client-credentials grant, which
    /// cannot control playback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// Returns `true` if both client id and secret are present.
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// A bearer token with its expiry deadline.
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Shape of the accounts service token response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Manages credentials and the cached bearer token.
pub(crate) struct TokenManager {
    http: Client,
    token_url: String,
    credentials: RwLock<Credentials>,
    token: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub(crate) fn new(http: Client, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            credentials: RwLock::new(credentials),
            token: Mutex::new(None),
        }
    }

    /// Replaces the credentials and drops any cached token.
    pub(crate) fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.write() = credentials;
        self.invalidate();
    }

    /// Drops the cached token so the next call re-authenticates.
    pub(crate) fn invalidate(&self) {
        *self.token.lock() = None;
    }

    /// Returns a valid bearer token, fetching a fresh one if needed.
    pub(crate) async fn bearer(&self) -> SpotifyResult<String> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }
        self.fetch_token().await
    }

    fn cached(&self) -> Option<String> {
        let guard = self.token.lock();
        guard
            .as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.access_token.clone())
    }

    async fn fetch_token(&self) -> SpotifyResult<String> {
        let credentials = self.credentials.read().clone();
        if !credentials.is_configured() {
            return Err(SpotifyError::Auth("credentials not configured".into()));
        }

        let params: Vec<(&str, &str)> = match credentials.refresh_token.as_deref() {
            Some(refresh_token) => vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            None => vec![("grant_type", "client_credentials")],
        };

        log::debug!("[Spotify] Requesting access token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Parse(format!("token response: {}", e)))?;

        let lifetime = token
            .expires_in
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
            .max(1);
        let access_token = token.access_token.clone();
        *self.token.lock() = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        log::debug!("[Spotify] Access token refreshed (valid {}s)", lifetime);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_are_not_configured() {
        assert!(!Credentials::default().is_configured());
    }

    #[test]
    fn credentials_roundtrip_without_refresh_token() {
        let creds = Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: None,
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert!(!json.contains("refresh_token"));
        let back: Credentials = serde_json::from_str(&json).unwrap();
        assert!(back.is_configured());
        assert!(back.refresh_token.is_none());
    }

    #[tokio::test]
    async fn bearer_fails_fast_without_credentials() {
        let manager = TokenManager::new(Client::new(), Credentials::default());
        let err = manager.bearer().await.unwrap_err();
        assert!(matches!(err, SpotifyError::Auth(_)));
    }
}

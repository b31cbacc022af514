//! Error types for Spotify Web API operations.

use thiserror::Error;

/// Errors from Spotify Web API requests.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Transport-level failure (DNS, connect, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API responded with a non-success status.
    #[error("Spotify API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// Token fetch failed or the API rejected our token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The API signalled rate limiting (HTTP 429).
    #[error("rate limited by Spotify API")]
    RateLimited,

    /// The response did not match the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl SpotifyError {
    /// Returns `true` if retrying the request later is reasonable.
    ///
    /// Auth failures are not transient: retrying with the same credentials
    /// yields the same rejection, so callers must re-establish the session
    /// instead.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status >= 500,
            Self::RateLimited => true,
            Self::Auth(_) | Self::Parse(_) => false,
        }
    }
}

/// Result alias for Spotify operations.
pub type SpotifyResult<T> = Result<T, SpotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = SpotifyError::Api {
            status: 503,
            body: "upstream unavailable".into(),
        };
        assert!(err.is_transient());
        assert!(SpotifyError::RateLimited.is_transient());
    }

    #[test]
    fn auth_and_client_errors_are_not_transient() {
        assert!(!SpotifyError::Auth("bad credentials".into()).is_transient());
        let err = SpotifyError::Api {
            status: 404,
            body: "no active device".into(),
        };
        assert!(!err.is_transient());
    }
}

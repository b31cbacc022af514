//! Centralized error types for the Perch core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::mixer::MixerError;
use crate::spotify::SpotifyError;

/// Application-wide error type for the Perch supervisor.
#[derive(Debug, Error)]
pub enum PerchError {
    /// Spotify Web API request failed (network fault, rate limit, bad response).
    #[error("Spotify request failed: {0}")]
    Spotify(String),

    /// Spotify authentication failed (missing or rejected credentials).
    #[error("Spotify authentication failed: {0}")]
    Auth(String),

    /// Audio mixer operation failed.
    #[error("Mixer error: {0}")]
    Mixer(String),

    /// A recovery action ran but did not restore the subsystem.
    #[error("Recovery failed: {0}")]
    Recovery(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The appliance has not reached the state required for the operation.
    ///
    /// Typical case: a reclaim is requested before a device id has been
    /// discovered from the backend.
    #[error("Appliance not ready: {0}")]
    NotReady(String),

    /// Supervisor configuration error (invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PerchError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spotify(_) => "spotify_error",
            Self::Auth(_) => "auth_failed",
            Self::Mixer(_) => "mixer_error",
            Self::Recovery(_) => "recovery_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotReady(_) => "not_ready",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotReady(_) | Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Spotify(_) | Self::Auth(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type PerchResult<T> = Result<T, PerchError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for PerchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<SpotifyError> for PerchError {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::Auth(msg) => Self::Auth(msg),
            other => Self::Spotify(other.to_string()),
        }
    }
}

impl From<MixerError> for PerchError {
    fn from(err: MixerError) -> Self {
        Self::Mixer(err.to_string())
    }
}

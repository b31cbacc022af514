//! Spotify Web API integration.
//!
//! The backend is the source of truth for device and session state; this
//! module provides the client the watchdog loops reconcile against. Services
//! depend on the traits in [`traits`] rather than the concrete client so
//! tests can substitute mocks.

pub mod auth;
pub mod client;
pub mod error;
pub mod traits;
pub mod types;

pub use auth::Credentials;
pub use client::SpotifyClientImpl;
pub use error::{SpotifyError, SpotifyResult};
pub use traits::{SpotifyClient, SpotifyDevices, SpotifyPlayback, SpotifySession};
pub use types::{CurrentPlayback, Device, TrackInfo};

//! Perch Core - supervisor library for a dedicated Spotify appliance.
//!
//! Perch keeps an always-on playback endpoint (typically a Raspberry Pi wired
//! into a house audio system) owned by the appliance and keeps the appliance
//! itself healthy. It runs three cooperating watchdog loops:
//!
//! - [`services::PlaybackReconciler`]: establishes the backend session and
//!   keeps playback running on the appliance's device
//! - [`services::OwnershipMonitor`]: reclaims the session when another
//!   Spotify Connect client captures it
//! - [`health::HealthMonitor`]: samples CPU/memory/disk/network and runs
//!   bounded self-recovery through [`recovery::RecoveryPolicy`]
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`state`]: Configuration, the shared appliance identity, credential persistence
//! - [`recovery`]: Bounded-attempt recovery policy shared by all self-healing
//! - [`spotify`]: Spotify Web API client behind injectable traits
//! - [`mixer`]: ALSA mixer variants behind a hardware-agnostic trait
//! - [`health`]: Resource checks and system-level recovery actions
//! - [`services`]: The playback and ownership watchdog loops
//! - [`supervisor`]: Composition root and the control panel's entry points
//! - [`api`]: Thin axum HTTP layer over the supervisor
//! - [`error`]: Centralized error types
//!
//! Loops share state only through the lock-guarded
//! [`IdentityHandle`](state::IdentityHandle) and observe a common
//! cancellation token, so shutdown interrupts their sleeps promptly and no
//! backend call outlives its timeout.

#![warn(clippy::all)]

pub mod api;
pub mod constants;
pub mod error;
pub mod health;
pub mod mixer;
pub mod recovery;
pub mod services;
pub mod spotify;
pub mod state;
pub mod supervisor;

// Re-export commonly used types at the crate root
pub use api::{start_server, AppState, ServerError};
pub use error::{PerchError, PerchResult};
pub use health::{HealthMonitor, HealthSnapshot, RecoveryActions, ShellRecovery, SysinfoSampler};
pub use mixer::{AlsaMixer, Mixer, MixerError};
pub use recovery::{RecoveryOutcome, RecoveryPolicy};
pub use services::{LinkState, OwnershipMonitor, PlaybackReconciler};
pub use spotify::{Credentials, SpotifyClient, SpotifyClientImpl, SpotifyError};
pub use state::{ApplianceIdentity, Config, CredentialStore, HealthConfig, IdentityHandle};
pub use supervisor::{StatusReport, Supervisor};

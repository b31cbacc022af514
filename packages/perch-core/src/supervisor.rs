//! Application bootstrap and supervision.
//!
//! This module contains the composition root - the single place where the
//! backend client, mixer, and watchdog loops are instantiated and wired
//! together - plus the [`Supervisor`] handle through which the control panel
//! touches core state. All dependency relationships are visible here; the
//! loops themselves never reach for ambient globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::constants::HTTP_TIMEOUT_SECS;
use crate::error::{PerchError, PerchResult};
use crate::health::{HealthMonitor, RecoveryActions, ShellRecovery, SysinfoSampler, SystemSampler};
use crate::mixer::{write_mono_asoundrc, AlsaMixer, Mixer};
use crate::recovery::RecoveryPolicy;
use crate::services::{LinkState, OwnershipMonitor, PlaybackReconciler};
use crate::spotify::{Credentials, SpotifyClient, SpotifyClientImpl, TrackInfo};
use crate::state::{Config, CredentialStore, IdentityHandle};

/// Snapshot returned to the control panel.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Local playback belief.
    pub is_playing: bool,
    /// Claimed backend device id, absent until discovered.
    pub device_id: Option<String>,
    /// Last track reported by the backend.
    pub current_track: Option<TrackInfo>,
    /// Mixer volume, absent when the mixer probe fails.
    pub volume: Option<u8>,
    /// Backend session state.
    pub link_state: LinkState,
}

/// Owns the appliance identity and the lifecycle of the watchdog loops.
pub struct Supervisor {
    config: Config,
    spotify: Arc<dyn SpotifyClient>,
    mixer: Arc<dyn Mixer>,
    identity: IdentityHandle,
    recovery: Arc<RecoveryPolicy>,
    reconciler: Arc<PlaybackReconciler>,
    ownership: Arc<OwnershipMonitor>,
    health: Arc<HealthMonitor>,
    credentials: Option<CredentialStore>,
    cancel: CancellationToken,
    started: AtomicBool,
}

/// Creates the shared HTTP client for all backend communication.
///
/// A single pooled client keeps connection reuse across the loops, and its
/// timeout bounds every backend call so no watchdog cycle can hang.
fn create_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

impl Supervisor {
    /// Bootstraps the production supervisor.
    ///
    /// Wiring order: HTTP client, persisted credentials, backend client,
    /// mixer, then the three loops sharing the identity record. Mixer
    /// detection failure is fatal - an audio appliance without audio output
    /// has no meaningful degraded mode, so the process should fail fast
    /// rather than limp.
    pub async fn bootstrap(config: Config) -> PerchResult<Self> {
        config.validate().map_err(PerchError::Configuration)?;

        let http_client = create_http_client();

        let credential_store = config.data_dir.as_ref().map(CredentialStore::new);
        let credentials = credential_store
            .as_ref()
            .map(|store| store.load())
            .unwrap_or_default();
        if !credentials.is_configured() {
            log::warn!(
                "[Bootstrap] No Spotify credentials configured; \
                 waiting for setup through the control panel"
            );
        }

        let spotify: Arc<dyn SpotifyClient> =
            Arc::new(SpotifyClientImpl::new(http_client, credentials));

        let mixer: Arc<dyn Mixer> = Arc::new(AlsaMixer::detect().await?);
        if config.force_mono {
            apply_mono_output();
        }
        if let Err(e) = mixer.set_volume(config.default_volume).await {
            log::warn!("[Bootstrap] Could not apply default volume: {}", e);
        }

        let sampler: Arc<dyn SystemSampler> = Arc::new(SysinfoSampler::new());
        let actions: Arc<dyn RecoveryActions> = Arc::new(ShellRecovery::new(
            config.wireless_interface.clone(),
            config.health.cache_dir.clone(),
            config.health.log_retention_days,
        ));

        Ok(Self::assemble(
            config,
            spotify,
            mixer,
            sampler,
            actions,
            credential_store,
        ))
    }

    /// Wires the supervisor from its parts.
    ///
    /// Used by [`bootstrap`](Self::bootstrap) in production and directly by
    /// tests with mock collaborators.
    pub fn assemble(
        config: Config,
        spotify: Arc<dyn SpotifyClient>,
        mixer: Arc<dyn Mixer>,
        sampler: Arc<dyn SystemSampler>,
        actions: Arc<dyn RecoveryActions>,
        credentials: Option<CredentialStore>,
    ) -> Self {
        let identity = IdentityHandle::new();
        let cancel = CancellationToken::new();
        let recovery = Arc::new(RecoveryPolicy::new(
            config.max_recovery_attempts,
            config.recovery_reset_threshold,
        ));

        let reconciler = Arc::new(PlaybackReconciler::new(
            Arc::clone(&spotify),
            identity.clone(),
            config.device_name.clone(),
            Duration::from_secs(config.reconcile_interval_secs),
            Duration::from_secs(config.reconcile_backoff_secs),
            cancel.clone(),
        ));

        let ownership = Arc::new(OwnershipMonitor::new(
            Arc::clone(&spotify),
            identity.clone(),
            Duration::from_secs(config.ownership_interval_secs),
            cancel.clone(),
        ));

        let health = Arc::new(HealthMonitor::new(
            sampler,
            actions,
            Arc::clone(&recovery),
            Arc::clone(&mixer),
            Arc::clone(&reconciler),
            identity.clone(),
            config.health.clone(),
            cancel.clone(),
        ));

        Self {
            config,
            spotify,
            mixer,
            identity,
            recovery,
            reconciler,
            ownership,
            health,
            credentials,
            cancel,
            started: AtomicBool::new(false),
        }
    }

    /// Starts the three watchdog loops as independent tasks.
    ///
    /// Idempotent: only the first call spawns anything.
    pub fn start_background_tasks(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("[Supervisor] Background tasks already started");
            return;
        }

        tokio::spawn(Arc::clone(&self.reconciler).run());
        tokio::spawn(Arc::clone(&self.ownership).run());
        tokio::spawn(Arc::clone(&self.health).run());
        log::info!("[Supervisor] Watchdog loops started");
    }

    /// Initiates graceful shutdown of all loops.
    pub async fn shutdown(&self) {
        log::info!("[Supervisor] Beginning graceful shutdown...");
        self.cancel.cancel();
        log::info!("[Supervisor] Shutdown complete");
    }

    /// Returns the current appliance state for the control panel.
    ///
    /// Degrades rather than fails: a dead mixer yields `volume: null`, an
    /// unestablished session yields absent device fields.
    pub async fn status(&self) -> StatusReport {
        let identity = self.identity.snapshot();
        StatusReport {
            is_playing: identity.is_playing,
            device_id: identity.device_id,
            current_track: identity.current_track,
            volume: self.mixer.get_volume().await.ok(),
            link_state: self.reconciler.link_state(),
        }
    }

    /// Sets the mixer volume; returns the clamped value actually applied.
    pub async fn set_volume(&self, volume: u8) -> PerchResult<u8> {
        let volume = volume.min(100);
        self.mixer.set_volume(volume).await?;
        Ok(volume)
    }

    /// Forces playback back to the appliance's device immediately.
    ///
    /// Same path the ownership monitor takes; safe to call repeatedly.
    pub async fn force_reclaim(&self) -> PerchResult<()> {
        self.ownership.reclaim().await
    }

    /// Replaces the backend credentials and re-establishes the session.
    ///
    /// Returns whether the appliance device was claimed. `false` means
    /// authentication succeeded but the Connect endpoint has not advertised
    /// yet; the reconciler keeps retrying in the background.
    pub async fn initialize_session(&self, credentials: Credentials) -> PerchResult<bool> {
        if !credentials.is_configured() {
            return Err(PerchError::InvalidRequest(
                "client_id and client_secret are required".into(),
            ));
        }

        if let Some(store) = &self.credentials {
            store
                .save(&credentials)
                .map_err(|e| PerchError::Internal(format!("persisting credentials: {}", e)))?;
        }

        self.spotify.set_credentials(credentials);
        self.identity.reset();
        let claimed = self.reconciler.establish_session().await?;
        Ok(claimed)
    }

    /// Returns the recovery policy, for observability.
    pub fn recovery_policy(&self) -> &Arc<RecoveryPolicy> {
        &self.recovery
    }

    /// Returns the configured control-panel port.
    pub fn bind_port(&self) -> u16 {
        self.config.bind_port
    }
}

/// Writes the mono downmix config to the controlling user's home directory.
fn apply_mono_output() {
    let Some(home) = std::env::var_os("HOME") else {
        log::warn!("[Bootstrap] HOME not set; skipping mono output setup");
        return;
    };
    let path = std::path::PathBuf::from(home).join(".asoundrc");
    match write_mono_asoundrc(&path) {
        Ok(()) => log::info!("[Bootstrap] Mono output configured at {}", path.display()),
        Err(e) => log::warn!("[Bootstrap] Mono output setup failed: {}", e),
    }
}

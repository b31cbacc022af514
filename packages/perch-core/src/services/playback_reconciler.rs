//! Playback reconciliation service.
//!
//! Responsibilities:
//! - Establishing the backend session (authenticate, find our device)
//! - Keeping playback running on the appliance's device
//! - Backing off after failed cycles without ever giving up
//!
//! The loop runs every second. A cycle that fails is logged, classified, and
//! followed by a longer backoff before the next cycle; no backend fault ever
//! terminates the loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::spotify::{SpotifyClient, SpotifyError, SpotifyResult};
use crate::state::IdentityHandle;

/// Connection state of the backend session, for logging and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No session; authentication has not succeeded.
    Disconnected,
    /// Authenticated but the appliance device is not yet advertised.
    Connecting,
    /// Device claimed, playback not yet confirmed.
    Idle,
    /// Playback running on the appliance device.
    Playing,
}

/// Keeps the backend playing on the appliance's device.
pub struct PlaybackReconciler {
    spotify: Arc<dyn SpotifyClient>,
    identity: IdentityHandle,
    /// Device name to look for in the backend's device list.
    device_name: String,
    link_state: Mutex<LinkState>,
    cycle_period: Duration,
    error_backoff: Duration,
    cancel: CancellationToken,
}

impl PlaybackReconciler {
    /// Creates a new reconciler.
    ///
    /// # Arguments
    /// * `spotify` - Backend client
    /// * `identity` - Shared appliance identity record
    /// * `device_name` - Advertised name of the appliance's own endpoint
    /// * `cycle_period` - Normal cadence between cycles
    /// * `error_backoff` - Cadence after a failed cycle
    /// * `cancel` - Token observed for graceful shutdown
    pub fn new(
        spotify: Arc<dyn SpotifyClient>,
        identity: IdentityHandle,
        device_name: String,
        cycle_period: Duration,
        error_backoff: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            spotify,
            identity,
            device_name,
            link_state: Mutex::new(LinkState::Disconnected),
            cycle_period,
            error_backoff,
            cancel,
        }
    }

    /// Returns the current connection state.
    pub fn link_state(&self) -> LinkState {
        *self.link_state.lock()
    }

    fn set_link_state(&self, state: LinkState) {
        let mut current = self.link_state.lock();
        if *current != state {
            log::info!("[Reconciler] Link state: {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// Authenticates and claims the appliance's device from the backend's
    /// device list.
    ///
    /// Returns `Ok(true)` once a device named like the appliance is claimed,
    /// `Ok(false)` when authentication worked but the device is not yet
    /// advertised (normal while the Connect endpoint is still registering;
    /// the next cycle retries).
    pub async fn establish_session(&self) -> SpotifyResult<bool> {
        self.set_link_state(LinkState::Connecting);
        self.spotify.authenticate().await?;

        let devices = self.spotify.list_devices().await?;
        match devices.into_iter().find(|d| d.name == self.device_name) {
            Some(device) => {
                log::info!(
                    "[Reconciler] Found appliance device '{}' ({})",
                    device.name,
                    device.id
                );
                self.identity.claim_device(device.id);
                self.set_link_state(LinkState::Idle);
                Ok(true)
            }
            None => {
                log::info!(
                    "[Reconciler] Device '{}' not advertised yet; will retry",
                    self.device_name
                );
                Ok(false)
            }
        }
    }

    /// Runs one reconciliation cycle.
    async fn run_cycle(&self) -> SpotifyResult<()> {
        if self.identity.device_id().is_none() && !self.establish_session().await? {
            return Ok(());
        }

        if let Some(device_id) = self.identity.device_id() {
            if !self.identity.is_playing() {
                self.spotify.start_playback(&device_id).await?;
                self.identity.mark_playing();
                self.set_link_state(LinkState::Playing);
                log::info!("[Reconciler] Playback started on {}", device_id);
            }
        }
        Ok(())
    }

    /// Classifies a cycle error and adjusts state accordingly.
    ///
    /// Transient faults keep the current session; the cycle simply retries
    /// after the backoff. Auth failures (and anything else) tear the session
    /// down so the next cycle re-establishes it from scratch.
    fn handle_cycle_error(&self, error: &SpotifyError) {
        if error.is_transient() {
            log::warn!("[Reconciler] Transient backend error: {}", error);
            return;
        }
        log::error!(
            "[Reconciler] Backend session lost ({}); will re-establish",
            error
        );
        self.identity.reset();
        self.set_link_state(LinkState::Disconnected);
    }

    /// Runs the reconciliation loop until cancelled.
    pub async fn run(self: Arc<Self>) {
        log::info!(
            "[Reconciler] Starting (device '{}', cycle {:?})",
            self.device_name,
            self.cycle_period
        );
        let mut delay = self.cycle_period;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("[Reconciler] Shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            delay = match self.run_cycle().await {
                Ok(()) => self.cycle_period,
                Err(e) => {
                    self.handle_cycle_error(&e);
                    self.error_backoff
                }
            };
        }
    }
}

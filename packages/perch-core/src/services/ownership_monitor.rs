//! Device ownership monitoring service.
//!
//! Other Spotify Connect clients on the account can capture the playback
//! session at any time (a phone in the same household, for instance). This
//! loop compares the backend's reported active device against the
//! appliance's claim every few seconds and transfers the session back when
//! it has been taken. Transfer is cheap and idempotent on the backend side,
//! so the loop retries naively without an escalation counter.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{PerchError, PerchResult};
use crate::spotify::{SpotifyClient, SpotifyResult};
use crate::state::IdentityHandle;

/// Watches for the playback session being captured by another client.
pub struct OwnershipMonitor {
    spotify: Arc<dyn SpotifyClient>,
    identity: IdentityHandle,
    cycle_period: Duration,
    cancel: CancellationToken,
}

impl OwnershipMonitor {
    /// Creates a new ownership monitor.
    pub fn new(
        spotify: Arc<dyn SpotifyClient>,
        identity: IdentityHandle,
        cycle_period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            spotify,
            identity,
            cycle_period,
            cancel,
        }
    }

    /// Transfers playback back to the appliance's device.
    ///
    /// Safe to call repeatedly; the backend treats a transfer to the
    /// already-active device as a no-op.
    pub async fn reclaim(&self) -> PerchResult<()> {
        let Some(device_id) = self.identity.device_id() else {
            return Err(PerchError::NotReady(
                "no appliance device claimed yet".into(),
            ));
        };
        self.spotify.transfer_playback(&device_id, true).await?;
        log::info!("[OwnershipMonitor] Playback transferred to {}", device_id);
        Ok(())
    }

    /// Runs one ownership check cycle.
    ///
    /// Also reconciles the local playback belief and last-seen track against
    /// the backend report, since the data is already in hand.
    async fn run_cycle(&self) -> SpotifyResult<()> {
        let Some(our_device_id) = self.identity.device_id() else {
            // Nothing claimed yet; reconciliation hasn't established a session.
            return Ok(());
        };

        match self.spotify.current_playback().await? {
            None => {
                // No active session anywhere: nothing to reclaim.
                self.identity.clear_playing();
                self.identity.set_current_track(None);
            }
            Some(playback) => {
                self.identity.set_current_track(playback.track);
                if playback.device.id != our_device_id {
                    log::warn!(
                        "[OwnershipMonitor] Playback captured by '{}' ({}); reclaiming",
                        playback.device.name,
                        playback.device.id
                    );
                    self.spotify
                        .transfer_playback(&our_device_id, true)
                        .await?;
                } else {
                    self.identity.sync_playing(playback.is_playing);
                }
            }
        }
        Ok(())
    }

    /// Runs the monitoring loop until cancelled.
    pub async fn run(self: Arc<Self>) {
        log::info!("[OwnershipMonitor] Starting (cycle {:?})", self.cycle_period);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("[OwnershipMonitor] Shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.cycle_period) => {}
            }

            if let Err(e) = self.run_cycle().await {
                // All backend faults are survivable here; same cadence retry.
                log::error!("[OwnershipMonitor] Check failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::spotify::{
        Credentials, CurrentPlayback, Device, SpotifyDevices, SpotifyPlayback, SpotifySession,
        TrackInfo,
    };

    /// Mock backend reporting a fixed playback snapshot.
    struct MockSpotify {
        playback: Mutex<Option<CurrentPlayback>>,
        transfer_calls: AtomicU32,
    }

    impl MockSpotify {
        fn reporting(playback: Option<CurrentPlayback>) -> Self {
            Self {
                playback: Mutex::new(playback),
                transfer_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SpotifyDevices for MockSpotify {
        async fn list_devices(&self) -> SpotifyResult<Vec<Device>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl SpotifyPlayback for MockSpotify {
        async fn current_playback(&self) -> SpotifyResult<Option<CurrentPlayback>> {
            Ok(self.playback.lock().clone())
        }

        async fn start_playback(&self, _device_id: &str) -> SpotifyResult<()> {
            Ok(())
        }

        async fn transfer_playback(&self, _device_id: &str, _force_play: bool) -> SpotifyResult<()> {
            self.transfer_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl SpotifySession for MockSpotify {
        fn set_credentials(&self, _credentials: Credentials) {}

        async fn authenticate(&self) -> SpotifyResult<()> {
            Ok(())
        }
    }

    fn playback_on(device_id: &str, is_playing: bool) -> CurrentPlayback {
        CurrentPlayback {
            device: Device {
                id: device_id.into(),
                name: "Some Device".into(),
                is_active: true,
            },
            is_playing,
            track: Some(TrackInfo {
                title: "So What".into(),
                artist: "Miles Davis".into(),
                uri: "spotify:track:xyz".into(),
            }),
        }
    }

    fn monitor(spotify: Arc<MockSpotify>, identity: IdentityHandle) -> OwnershipMonitor {
        OwnershipMonitor::new(
            spotify,
            identity,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn mismatch_triggers_exactly_one_transfer() {
        let spotify = Arc::new(MockSpotify::reporting(Some(playback_on("B", true))));
        let identity = IdentityHandle::new();
        identity.claim_device("A".into());

        let service = monitor(Arc::clone(&spotify), identity);
        service.run_cycle().await.unwrap();

        assert_eq!(spotify.transfer_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn playback_on_own_device_triggers_no_transfer() {
        let spotify = Arc::new(MockSpotify::reporting(Some(playback_on("A", true))));
        let identity = IdentityHandle::new();
        identity.claim_device("A".into());

        let service = monitor(Arc::clone(&spotify), identity.clone());
        service.run_cycle().await.unwrap();

        assert_eq!(spotify.transfer_calls.load(Ordering::SeqCst), 0);
        assert!(identity.is_playing());
        assert_eq!(identity.current_track().unwrap().title, "So What");
    }

    #[tokio::test]
    async fn no_active_playback_triggers_no_transfer() {
        let spotify = Arc::new(MockSpotify::reporting(None));
        let identity = IdentityHandle::new();
        identity.claim_device("A".into());
        identity.mark_playing();

        let service = monitor(Arc::clone(&spotify), identity.clone());
        service.run_cycle().await.unwrap();

        assert_eq!(spotify.transfer_calls.load(Ordering::SeqCst), 0);
        // Belief reconciled against backend truth.
        assert!(!identity.is_playing());
    }

    #[tokio::test]
    async fn unclaimed_identity_skips_the_check() {
        let spotify = Arc::new(MockSpotify::reporting(Some(playback_on("B", true))));
        let service = monitor(Arc::clone(&spotify), IdentityHandle::new());

        service.run_cycle().await.unwrap();
        assert_eq!(spotify.transfer_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reclaim_is_idempotent() {
        let spotify = Arc::new(MockSpotify::reporting(Some(playback_on("A", true))));
        let identity = IdentityHandle::new();
        identity.claim_device("A".into());

        let service = monitor(Arc::clone(&spotify), identity);
        service.reclaim().await.unwrap();
        service.reclaim().await.unwrap();

        // Repeated transfers are harmless no-ops on the backend side.
        assert_eq!(spotify.transfer_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reclaim_without_device_reports_not_ready() {
        let spotify = Arc::new(MockSpotify::reporting(None));
        let service = monitor(spotify, IdentityHandle::new());

        let err = service.reclaim().await.unwrap_err();
        assert!(matches!(err, PerchError::NotReady(_)));
    }
}

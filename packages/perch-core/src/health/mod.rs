//! System health monitoring service.
//!
//! Responsibilities:
//! - Periodic CPU / memory / disk / network checks
//! - Audio and backend-session probes, same pattern
//! - Bounded recovery through [`RecoveryPolicy`] for the heavyweight actions
//!
//! Cheap, idempotent cleanups (memory, disk) run ungated whenever their check
//! fails. Service restarts route through the recovery policy so a wedged
//! subsystem cannot trigger a restart storm. The loop itself runs every
//! minute, dropping to a 10-second cadence for one cycle after an error.

pub mod actions;
pub mod sampler;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{PerchError, PerchResult};
use crate::mixer::Mixer;
use crate::recovery::RecoveryPolicy;
use crate::services::PlaybackReconciler;
use crate::state::{HealthConfig, IdentityHandle};

pub use actions::{RecoveryActions, ShellRecovery};
pub use sampler::{SysinfoSampler, SystemSampler};

/// Result of one health check cycle.
///
/// Produced fresh each cycle for logging; never retained.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// CPU utilization below threshold.
    pub cpu: bool,
    /// Memory utilization below threshold.
    pub memory: bool,
    /// Disk utilization below threshold.
    pub disk: bool,
    /// Public endpoint reachable.
    pub network: bool,
    /// Mixer responding.
    pub audio: bool,
    /// Backend session established.
    pub spotify: bool,
}

impl HealthSnapshot {
    fn all_passing() -> Self {
        Self {
            cpu: true,
            memory: true,
            disk: true,
            network: true,
            audio: true,
            spotify: true,
        }
    }

    /// Returns `true` when every check passed.
    pub fn healthy(&self) -> bool {
        self.cpu && self.memory && self.disk && self.network && self.audio && self.spotify
    }
}

/// Attempts a TCP connection to verify reachability.
pub(crate) async fn probe_connectivity(addr: &str, timeout: Duration) -> std::io::Result<()> {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect to {} timed out", addr),
        )),
    }
}

/// Watches host resources and self-heals within the recovery policy's bounds.
pub struct HealthMonitor {
    sampler: Arc<dyn SystemSampler>,
    actions: Arc<dyn RecoveryActions>,
    policy: Arc<RecoveryPolicy>,
    mixer: Arc<dyn Mixer>,
    reconciler: Arc<PlaybackReconciler>,
    identity: IdentityHandle,
    config: HealthConfig,
    cancel: CancellationToken,
}

impl HealthMonitor {
    /// Creates a new health monitor.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sampler: Arc<dyn SystemSampler>,
        actions: Arc<dyn RecoveryActions>,
        policy: Arc<RecoveryPolicy>,
        mixer: Arc<dyn Mixer>,
        reconciler: Arc<PlaybackReconciler>,
        identity: IdentityHandle,
        config: HealthConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sampler,
            actions,
            policy,
            mixer,
            reconciler,
            identity,
            config,
            cancel,
        }
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.config.probe_timeout_secs)
    }

    /// Runs all checks once.
    ///
    /// Checks are independent: one failing check never prevents the others
    /// from running in the same cycle.
    async fn run_cycle(&self) -> PerchResult<HealthSnapshot> {
        let mut snapshot = HealthSnapshot::all_passing();

        // CPU spikes are not self-healed; they usually mean transcoding or
        // an update is running and resolve on their own.
        let cpu = self.sampler.cpu_percent();
        if cpu > self.config.cpu_threshold_pct {
            log::warn!("[HealthMonitor] High CPU usage: {:.1}%", cpu);
            snapshot.cpu = false;
        }

        let memory = self.sampler.memory_percent();
        if memory > self.config.memory_threshold_pct {
            log::warn!("[HealthMonitor] High memory usage: {:.1}%", memory);
            snapshot.memory = false;
            if let Err(e) = self.actions.reclaim_memory().await {
                log::error!("[HealthMonitor] Memory cleanup failed: {}", e);
            }
        }

        let disk = self.sampler.disk_percent()?;
        if disk > self.config.disk_threshold_pct {
            log::warn!("[HealthMonitor] Low disk space: {:.1}% used", disk);
            snapshot.disk = false;
            if let Err(e) = self.actions.cleanup_disk().await {
                log::error!("[HealthMonitor] Disk cleanup failed: {}", e);
            }
        }

        snapshot.network = self.check_network().await;
        snapshot.audio = self.check_audio().await;
        snapshot.spotify = self.check_spotify().await;

        Ok(snapshot)
    }

    async fn check_network(&self) -> bool {
        match probe_connectivity(&self.config.probe_addr, self.probe_timeout()).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("[HealthMonitor] Network connectivity check failed: {}", e);
                self.policy
                    .attempt_recovery("network", || self.recover_network())
                    .await;
                false
            }
        }
    }

    /// Network recovery: restart the network service, and if the probe still
    /// fails after a short pause, cycle the wireless interface.
    ///
    /// Reports success only when the probe actually passes afterwards.
    async fn recover_network(&self) -> PerchResult<()> {
        self.actions.restart_network_service().await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        if probe_connectivity(&self.config.probe_addr, self.probe_timeout())
            .await
            .is_ok()
        {
            return Ok(());
        }

        self.actions.cycle_wireless_interface().await?;
        probe_connectivity(&self.config.probe_addr, self.probe_timeout())
            .await
            .map_err(|e| {
                PerchError::Recovery(format!("network still unreachable after recovery: {}", e))
            })
    }

    async fn check_audio(&self) -> bool {
        match self.mixer.get_volume().await {
            Ok(_) => true,
            Err(e) => {
                log::error!("[HealthMonitor] Mixer probe failed: {}", e);
                self.policy
                    .attempt_recovery("audio", || async {
                        self.actions.restart_audio_driver().await?;
                        // Confirm the mixer actually came back.
                        self.mixer.get_volume().await.map(|_| ()).map_err(|e| {
                            PerchError::Recovery(format!("mixer still down after restart: {}", e))
                        })
                    })
                    .await;
                false
            }
        }
    }

    async fn check_spotify(&self) -> bool {
        if self.identity.device_id().is_some() {
            return true;
        }
        log::warn!("[HealthMonitor] No backend session established");
        self.policy
            .attempt_recovery("spotify", || async {
                match self.reconciler.establish_session().await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(PerchError::Recovery(
                        "appliance device not advertised by backend".into(),
                    )),
                    Err(e) => Err(e.into()),
                }
            })
            .await;
        false
    }

    /// Runs the monitoring loop until cancelled.
    pub async fn run(self: Arc<Self>) {
        log::info!(
            "[HealthMonitor] Starting (cycle {}s, retry {}s)",
            self.config.interval_secs,
            self.config.retry_secs
        );
        let normal = Duration::from_secs(self.config.interval_secs);
        let retry = Duration::from_secs(self.config.retry_secs);
        let mut delay = normal;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("[HealthMonitor] Shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            delay = match self.run_cycle().await {
                Ok(snapshot) => {
                    if snapshot.healthy() {
                        log::info!("[HealthMonitor] Health status: {:?}", snapshot);
                    } else {
                        log::warn!("[HealthMonitor] Health status: {:?}", snapshot);
                    }
                    normal
                }
                Err(e) => {
                    log::error!("[HealthMonitor] Health check error: {}", e);
                    retry
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::mixer::MixerError;
    use crate::spotify::{
        Credentials, CurrentPlayback, Device, SpotifyDevices, SpotifyPlayback, SpotifyResult,
        SpotifySession,
    };

    /// Sampler with scripted readings.
    struct FixedSampler {
        cpu: f32,
        memory: f32,
        disk: f32,
    }

    impl SystemSampler for FixedSampler {
        fn cpu_percent(&self) -> f32 {
            self.cpu
        }
        fn memory_percent(&self) -> f32 {
            self.memory
        }
        fn disk_percent(&self) -> PerchResult<f32> {
            Ok(self.disk)
        }
    }

    /// Actions that count invocations and fail service restarts.
    #[derive(Default)]
    struct CountingActions {
        memory_cleanups: AtomicU32,
        disk_cleanups: AtomicU32,
        network_restarts: AtomicU32,
        audio_restarts: AtomicU32,
    }

    #[async_trait]
    impl RecoveryActions for CountingActions {
        async fn reclaim_memory(&self) -> PerchResult<()> {
            self.memory_cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn cleanup_disk(&self) -> PerchResult<()> {
            self.disk_cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn restart_network_service(&self) -> PerchResult<()> {
            self.network_restarts.fetch_add(1, Ordering::SeqCst);
            Err(PerchError::Recovery("restart had no effect".into()))
        }
        async fn cycle_wireless_interface(&self) -> PerchResult<()> {
            Ok(())
        }
        async fn restart_audio_driver(&self) -> PerchResult<()> {
            self.audio_restarts.fetch_add(1, Ordering::SeqCst);
            Err(PerchError::Recovery("driver still dead".into()))
        }
    }

    struct MockMixer {
        fail: bool,
    }

    #[async_trait]
    impl Mixer for MockMixer {
        fn control_name(&self) -> &str {
            "PCM"
        }
        async fn get_volume(&self) -> Result<u8, MixerError> {
            if self.fail {
                Err(MixerError::Command("amixer: no such control".into()))
            } else {
                Ok(70)
            }
        }
        async fn set_volume(&self, _volume: u8) -> Result<(), MixerError> {
            Ok(())
        }
    }

    struct MockSpotify;

    #[async_trait]
    impl SpotifyDevices for MockSpotify {
        async fn list_devices(&self) -> SpotifyResult<Vec<Device>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl SpotifyPlayback for MockSpotify {
        async fn current_playback(&self) -> SpotifyResult<Option<CurrentPlayback>> {
            Ok(None)
        }
        async fn start_playback(&self, _device_id: &str) -> SpotifyResult<()> {
            Ok(())
        }
        async fn transfer_playback(&self, _device_id: &str, _force_play: bool) -> SpotifyResult<()> {
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

    struct Fixture {
        monitor: HealthMonitor,
        actions: Arc<CountingActions>,
        policy: Arc<RecoveryPolicy>,
    }

    fn fixture(sampler: FixedSampler, probe_addr: &str, mixer_fail: bool) -> Fixture {
        let identity = IdentityHandle::new();
        identity.claim_device("dev1".into());

        let actions = Arc::new(CountingActions::default());
        let policy = Arc::new(RecoveryPolicy::new(3, 10));
        let reconciler = Arc::new(PlaybackReconciler::new(
            Arc::new(MockSpotify),
            identity.clone(),
            "Spotify Appliance".into(),
            Duration::from_secs(1),
            Duration::from_secs(5),
            CancellationToken::new(),
        ));

        let config = HealthConfig {
            probe_addr: probe_addr.to_string(),
            probe_timeout_secs: 1,
            ..Default::default()
        };

        let monitor = HealthMonitor::new(
            Arc::new(sampler),
            Arc::clone(&actions) as Arc<dyn RecoveryActions>,
            Arc::clone(&policy),
            Arc::new(MockMixer { fail: mixer_fail }),
            reconciler,
            identity,
            config,
            CancellationToken::new(),
        );

        Fixture {
            monitor,
            actions,
            policy,
        }
    }

    /// Binds a listener so the probe address is genuinely reachable.
    async fn reachable_addr() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Returns an address nothing is listening on.
    async fn unreachable_addr() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn memory_below_threshold_passes_without_cleanup() {
        let (_listener, addr) = reachable_addr().await;
        let f = fixture(
            FixedSampler {
                cpu: 10.0,
                memory: 79.0,
                disk: 50.0,
            },
            &addr,
            false,
        );

        let snapshot = f.monitor.run_cycle().await.unwrap();
        assert!(snapshot.memory);
        assert_eq!(f.actions.memory_cleanups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn memory_above_threshold_fails_and_cleans_up() {
        let (_listener, addr) = reachable_addr().await;
        let f = fixture(
            FixedSampler {
                cpu: 10.0,
                memory: 81.0,
                disk: 50.0,
            },
            &addr,
            false,
        );

        let snapshot = f.monitor.run_cycle().await.unwrap();
        assert!(!snapshot.memory);
        assert_eq!(f.actions.memory_cleanups.load(Ordering::SeqCst), 1);
        // Memory cleanup is ungated: the recovery policy is never involved.
        assert_eq!(f.policy.attempts("memory"), 0);
    }

    #[tokio::test]
    async fn high_cpu_fails_check_without_any_action() {
        let (_listener, addr) = reachable_addr().await;
        let f = fixture(
            FixedSampler {
                cpu: 95.0,
                memory: 40.0,
                disk: 50.0,
            },
            &addr,
            false,
        );

        let snapshot = f.monitor.run_cycle().await.unwrap();
        assert!(!snapshot.cpu);
        assert!(!snapshot.healthy());
        assert_eq!(f.actions.memory_cleanups.load(Ordering::SeqCst), 0);
        assert_eq!(f.actions.disk_cleanups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_disk_triggers_cleanup() {
        let (_listener, addr) = reachable_addr().await;
        let f = fixture(
            FixedSampler {
                cpu: 10.0,
                memory: 40.0,
                disk: 92.0,
            },
            &addr,
            false,
        );

        let snapshot = f.monitor.run_cycle().await.unwrap();
        assert!(!snapshot.disk);
        assert_eq!(f.actions.disk_cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reachable_network_passes_without_policy_invocation() {
        let (_listener, addr) = reachable_addr().await;
        let f = fixture(
            FixedSampler {
                cpu: 10.0,
                memory: 40.0,
                disk: 50.0,
            },
            &addr,
            false,
        );

        let snapshot = f.monitor.run_cycle().await.unwrap();
        assert!(snapshot.network);
        assert_eq!(f.policy.attempts("network"), 0);
        assert_eq!(f.actions.network_restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_network_fails_with_one_policy_attempt() {
        let addr = unreachable_addr().await;
        let f = fixture(
            FixedSampler {
                cpu: 10.0,
                memory: 40.0,
                disk: 50.0,
            },
            &addr,
            false,
        );

        let snapshot = f.monitor.run_cycle().await.unwrap();
        assert!(!snapshot.network);
        assert_eq!(f.policy.attempts("network"), 1);
        assert_eq!(f.actions.network_restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dead_mixer_routes_through_audio_recovery() {
        let (_listener, addr) = reachable_addr().await;
        let f = fixture(
            FixedSampler {
                cpu: 10.0,
                memory: 40.0,
                disk: 50.0,
            },
            &addr,
            true,
        );

        let snapshot = f.monitor.run_cycle().await.unwrap();
        assert!(!snapshot.audio);
        assert_eq!(f.policy.attempts("audio"), 1);
        assert_eq!(f.actions.audio_restarts.load(Ordering::SeqCst), 1);
    }
}

//! System-level recovery actions.
//!
//! Shell commands the health monitor fires to repair the host. Cleanup
//! actions (memory, disk) are best-effort: individual step failures are
//! logged but never escalate. Service restarts (network, audio) report their
//! real outcome so the recovery policy can count failures honestly.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PerchError, PerchResult};

/// Recovery actions available to the health monitor.
#[async_trait]
pub trait RecoveryActions: Send + Sync {
    /// Asks the kernel to drop reclaimable caches.
    async fn reclaim_memory(&self) -> PerchResult<()>;

    /// Purges old journal entries, the package cache, and stale cache files.
    async fn cleanup_disk(&self) -> PerchResult<()>;

    /// Restarts the system network service.
    async fn restart_network_service(&self) -> PerchResult<()>;

    /// Takes the wireless interface down and back up.
    async fn cycle_wireless_interface(&self) -> PerchResult<()>;

    /// Restarts the audio subsystem.
    async fn restart_audio_driver(&self) -> PerchResult<()>;
}

/// Production implementation shelling out to system tools.
pub struct ShellRecovery {
    wireless_interface: String,
    cache_dir: PathBuf,
    retention_days: u32,
}

impl ShellRecovery {
    /// Creates the shell-backed recovery actions.
    ///
    /// # Arguments
    /// * `wireless_interface` - Interface cycled by network recovery (e.g. `wlan0`)
    /// * `cache_dir` - Directory swept for stale files during disk cleanup
    /// * `retention_days` - Age past which journal/cache entries are purged
    pub fn new(wireless_interface: String, cache_dir: PathBuf, retention_days: u32) -> Self {
        Self {
            wireless_interface,
            cache_dir,
            retention_days,
        }
    }
}

#[async_trait]
impl RecoveryActions for ShellRecovery {
    async fn reclaim_memory(&self) -> PerchResult<()> {
        // Flush dirty pages first so dropping caches actually frees memory.
        if let Err(e) = run_command("sync", &[]).await {
            log::warn!("[Recovery] sync before cache drop failed: {}", e);
        }
        match tokio::fs::write("/proc/sys/vm/drop_caches", "1\n").await {
            Ok(()) => {
                log::info!("[Recovery] Dropped page cache");
                Ok(())
            }
            Err(e) => {
                // Unprivileged runs (development) can't write there; log only.
                log::warn!("[Recovery] Could not drop caches: {}", e);
                Ok(())
            }
        }
    }

    async fn cleanup_disk(&self) -> PerchResult<()> {
        let vacuum = format!("--vacuum-time={}d", self.retention_days);
        if let Err(e) = run_command("journalctl", &[&vacuum]).await {
            log::warn!("[Recovery] Journal vacuum failed: {}", e);
        }
        if let Err(e) = run_command("apt-get", &["clean"]).await {
            log::warn!("[Recovery] Package cache clean failed: {}", e);
        }

        let removed = remove_stale_files(&self.cache_dir, self.retention_days);
        log::info!(
            "[Recovery] Disk cleanup completed ({} stale cache files removed)",
            removed
        );
        Ok(())
    }

    async fn restart_network_service(&self) -> PerchResult<()> {
        run_command("systemctl", &["restart", "systemd-networkd"]).await?;
        log::info!("[Recovery] Network service restarted");
        Ok(())
    }

    async fn cycle_wireless_interface(&self) -> PerchResult<()> {
        run_command("ip", &["link", "set", &self.wireless_interface, "down"]).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        run_command("ip", &["link", "set", &self.wireless_interface, "up"]).await?;
        log::info!(
            "[Recovery] Cycled wireless interface {}",
            self.wireless_interface
        );
        Ok(())
    }

    async fn restart_audio_driver(&self) -> PerchResult<()> {
        run_command("systemctl", &["restart", "alsa-state"]).await?;
        log::info!("[Recovery] Audio subsystem restarted");
        Ok(())
    }
}

/// Runs a command, mapping spawn failures and non-zero exits to errors.
async fn run_command(program: &str, args: &[&str]) -> PerchResult<()> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| PerchError::Recovery(format!("{} {}: {}", program, args.join(" "), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PerchError::Recovery(format!(
            "{} {} exited with {}: {}",
            program,
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// Removes regular files under `dir` older than `retention_days`.
///
/// Returns the number of files removed. Unreadable entries are skipped;
/// subdirectories are left alone.
fn remove_stale_files(dir: &Path, retention_days: u32) -> usize {
    let cutoff = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let now = SystemTime::now();
    let mut removed = 0;

    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let stale = now
            .duration_since(modified)
            .map(|age| age > cutoff)
            .unwrap_or(false);
        if stale && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_file_sweep_ignores_missing_dir() {
        assert_eq!(remove_stale_files(Path::new("/nonexistent/perch"), 7), 0);
    }

    #[test]
    fn stale_file_sweep_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fresh.dat"), b"x").unwrap();

        assert_eq!(remove_stale_files(dir.path(), 7), 0);
        assert!(dir.path().join("fresh.dat").exists());
    }
}

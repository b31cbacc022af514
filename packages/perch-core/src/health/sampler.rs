//! Host resource sampling.
//!
//! Thin wrapper over `sysinfo` behind a trait so the health monitor can be
//! tested with scripted readings.

use std::path::PathBuf;

use parking_lot::Mutex;
use sysinfo::{Disks, System};

use crate::error::{PerchError, PerchResult};

/// Resource utilization source for the health monitor.
pub trait SystemSampler: Send + Sync {
    /// Global CPU utilization percentage.
    ///
    /// The first reading after startup may be zero; utilization needs two
    /// samples to compute and our cycles are far enough apart.
    fn cpu_percent(&self) -> f32;

    /// Memory utilization percentage.
    fn memory_percent(&self) -> f32;

    /// Utilization percentage of the filesystem holding the root path.
    fn disk_percent(&self) -> PerchResult<f32>;
}

/// Production sampler backed by `sysinfo`.
pub struct SysinfoSampler {
    system: Mutex<System>,
    root_path: PathBuf,
}

impl SysinfoSampler {
    /// Creates a sampler monitoring the filesystem that holds `/`.
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Creates a sampler monitoring the filesystem holding the given path.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            root_path: root.into(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for SysinfoSampler {
    fn cpu_percent(&self) -> f32 {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.global_cpu_info().cpu_usage()
    }

    fn memory_percent(&self) -> f32 {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (system.used_memory() as f32 / total as f32) * 100.0
    }

    fn disk_percent(&self) -> PerchResult<f32> {
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point that is a prefix of the root path wins, so
        // e.g. a separate /var mount is not mistaken for /.
        let disk = disks
            .list()
            .iter()
            .filter(|d| self.root_path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                PerchError::Internal(format!(
                    "no disk found for {}",
                    self.root_path.display()
                ))
            })?;

        let total = disk.total_space();
        if total == 0 {
            return Err(PerchError::Internal(format!(
                "disk for {} reports zero capacity",
                self.root_path.display()
            )));
        }
        let used = total - disk.available_space();
        Ok((used as f32 / total as f32) * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_percent_is_within_bounds() {
        let sampler = SysinfoSampler::new();
        let pct = sampler.memory_percent();
        assert!((0.0..=100.0).contains(&pct), "memory at {}%", pct);
    }

    #[test]
    fn disk_percent_is_a_percentage_when_resolvable() {
        let sampler = SysinfoSampler::new();
        // Containerized environments sometimes expose no disk list; a real
        // appliance always resolves /.
        match sampler.disk_percent() {
            Ok(pct) => assert!((0.0..=100.0).contains(&pct), "disk at {}%", pct),
            Err(e) => assert!(matches!(e, PerchError::Internal(_))),
        }
    }
}

//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the control panel to.
    /// Override: `PERCH_BIND_PORT`
    pub bind_port: u16,

    /// Device name the appliance advertises to Spotify Connect.
    /// Override: `PERCH_DEVICE_NAME`
    pub device_name: String,

    /// Volume applied to the mixer at startup (percent).
    pub default_volume: u8,

    /// Route both stereo channels to a single output.
    pub force_mono: bool,

    /// Wireless interface cycled by network recovery.
    /// Override: `PERCH_WIRELESS_INTERFACE`
    pub wireless_interface: String,

    /// Endpoint probed to verify network reachability.
    pub connectivity_probe_addr: String,

    /// Directory for persistent data (Spotify credentials).
    /// Override: `PERCH_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = perch_core::Config::default();
        Self {
            bind_port: core.bind_port,
            device_name: core.device_name,
            default_volume: core.default_volume,
            force_mono: core.force_mono,
            wireless_interface: core.wireless_interface,
            connectivity_probe_addr: core.health.probe_addr,
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PERCH_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("PERCH_DEVICE_NAME") {
            if !val.is_empty() {
                self.device_name = val;
            }
        }

        if let Ok(val) = std::env::var("PERCH_WIRELESS_INTERFACE") {
            if !val.is_empty() {
                self.wireless_interface = val;
            }
        }

        // Note: PERCH_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to perch-core's Config type.
    pub fn to_core_config(&self) -> perch_core::Config {
        perch_core::Config {
            bind_port: self.bind_port,
            device_name: self.device_name.clone(),
            default_volume: self.default_volume,
            force_mono: self.force_mono,
            wireless_interface: self.wireless_interface.clone(),
            data_dir: self.data_dir.clone(),
            health: perch_core::HealthConfig {
                probe_addr: self.connectivity_probe_addr.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

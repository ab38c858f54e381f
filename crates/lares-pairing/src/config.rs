//! Pairing engine configuration.
//!
//! Loads settings from /etc/lares/pairing.toml or uses defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/lares/pairing.toml";

/// Address a device hands out for its own setup access point. Reaching a
/// device there says nothing about where it will live on the real network,
/// so this must never be stored as a record's host.
pub const AP_FALLBACK_IP: &str = "192.168.33.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Per-request HTTP timeout for device probes, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Port devices serve their local API on.
    #[serde(default = "default_device_port")]
    pub device_port: u16,

    /// Self-hosted access-point address, excluded from host updates.
    #[serde(default = "default_ap_fallback_ip")]
    pub ap_fallback_ip: String,
}

fn default_http_timeout() -> u64 {
    10
}

fn default_device_port() -> u16 {
    80
}

fn default_ap_fallback_ip() -> String {
    AP_FALLBACK_IP.to_string()
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            device_port: default_device_port(),
            ap_fallback_ip: default_ap_fallback_ip(),
        }
    }
}

impl PairingConfig {
    /// Load config from the given path, falling back to defaults when the
    /// file is absent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Pairing config not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pairing config: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pairing config: {:?}", path))?;
        info!("Loaded pairing config from {:?}", path);
        Ok(config)
    }
}

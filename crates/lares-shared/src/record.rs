//! Persisted device records.
//!
//! A `DeviceRecord` is the durable outcome of a pairing flow. Ownership moves
//! to the record store once a flow finalizes; the flows themselves only ever
//! hold transient session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Device protocol generation.
///
/// Generation 1 devices speak the legacy HTTP API and authenticate with a
/// caller-chosen username; generation 2/3 devices speak the RPC API and
/// always authenticate as `admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Generation {
    Gen1,
    Gen2,
    Gen3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown device generation {0}")]
pub struct UnknownGeneration(pub u8);

impl Generation {
    /// Legacy devices use the old settings schema and per-user auth.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Generation::Gen1)
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Generation::Gen1 => 1,
            Generation::Gen2 => 2,
            Generation::Gen3 => 3,
        }
    }
}

impl From<Generation> for u8 {
    fn from(generation: Generation) -> u8 {
        generation.as_u8()
    }
}

impl TryFrom<u8> for Generation {
    type Error = UnknownGeneration;

    fn try_from(value: u8) -> Result<Self, UnknownGeneration> {
        match value {
            1 => Ok(Generation::Gen1),
            2 => Ok(Generation::Gen2),
            3 => Ok(Generation::Gen3),
            other => Err(UnknownGeneration(other)),
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Credentials collected during an auth challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Scanning mode for the device's secondary radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerMode {
    Disabled,
    Active,
    Passive,
}

impl fmt::Display for ScannerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerMode::Disabled => write!(f, "disabled"),
            ScannerMode::Active => write!(f, "active"),
            ScannerMode::Passive => write!(f, "passive"),
        }
    }
}

/// Post-pairing options saved by the options flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner_mode: Option<ScannerMode>,
}

impl DeviceOptions {
    pub fn is_empty(&self) -> bool {
        self.scanner_mode.is_none()
    }
}

/// A paired device as stored by the hub.
///
/// Invariant: at most one live record per identity key. Re-pairing the same
/// identity refreshes the existing record's host instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable MAC-like identity key, uppercase hex without separators.
    pub identity: String,

    /// Last known reachable address.
    pub host: String,

    /// Canonical model identifier reported by the device.
    pub model: String,

    pub generation: Generation,

    /// Seconds the device sleeps between check-ins; 0 = always-on.
    pub sleep_period: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "DeviceOptions::is_empty")]
    pub options: DeviceOptions,

    pub paired_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn sleeps(&self) -> bool {
        self.sleep_period > 0
    }

    /// Secondary options are only pushable to always-on generation 2+
    /// devices; sleeping devices cannot reliably receive the follow-up
    /// configuration push.
    pub fn supports_options(&self) -> bool {
        !self.generation.is_legacy() && !self.sleeps()
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.username = Some(credentials.username);
        self.password = Some(credentials.password);
    }
}

//! Device classification.
//!
//! Turns a probe payload plus a device session into the canonical
//! attributes the record stores. The fallbacks are written as an explicit
//! ordered rule list so each one stays testable without a probe call.

use crate::probe::{DeviceSession, RawDeviceInfo, SleepSettings, SleepUnit};
use lares_shared::record::Generation;
use thiserror::Error;

/// Canonical attributes derived from one probe + connect pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub model: String,
    pub generation: Generation,
    pub sleep_period: u32,
    pub requires_auth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// The device is connectable but reports no model key. This is a
    /// half-provisioned firmware state, not a hard failure: a later probe
    /// may see provisioning completed.
    #[error("device did not report a model key")]
    ModelKeyMissing,

    #[error("unsupported device generation {0}")]
    UnsupportedGeneration(u8),
}

/// Derive the canonical profile. Rules in order:
///
/// 1. generation: reported value, else 1.
/// 2. model: session model key, else the info payload's hint, else
///    `ModelKeyMissing`.
/// 3. sleep period: gen 1 converts settings units to seconds, gen 2+ takes
///    `wakeup_period` verbatim; 0 when absent.
/// 4. auth requirement: the info payload's flag.
pub fn classify(
    info: &RawDeviceInfo,
    session: &DeviceSession,
) -> Result<DeviceProfile, ClassifyError> {
    let generation = generation_of(info)?;

    let model = session
        .model
        .as_deref()
        .or_else(|| info.model_hint())
        .ok_or(ClassifyError::ModelKeyMissing)?
        .to_string();

    let sleep_period = if generation.is_legacy() {
        session.sleep.map(sleep_seconds).unwrap_or(0)
    } else {
        session.wakeup_period.unwrap_or(0)
    };

    Ok(DeviceProfile {
        model,
        generation,
        sleep_period,
        requires_auth: info.requires_auth,
    })
}

/// Rule 1 on its own, for steps that need the generation before any
/// connect has happened (auth field selection).
pub fn generation_of(info: &RawDeviceInfo) -> Result<Generation, ClassifyError> {
    let raw = info.gen.unwrap_or(1);
    Generation::try_from(raw).map_err(|_| ClassifyError::UnsupportedGeneration(raw))
}

/// Generation-1 sleep settings are minutes or hours; records hold seconds.
fn sleep_seconds(settings: SleepSettings) -> u32 {
    let minutes = match settings.unit {
        SleepUnit::Minutes => settings.period,
        SleepUnit::Hours => settings.period * 60,
    };
    minutes * 60
}

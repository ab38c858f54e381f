//! Error codes and flow-level errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// String error codes surfaced to the UI/caller.
///
/// These are wire-stable: frontends key translations off the snake_case
/// strings, so variants must never be renamed lightly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    CannotConnect,
    InvalidAuth,
    Unknown,
    UnsupportedFirmware,
    FirmwareNotFullyProvisioned,
    AlreadyConfigured,
    ReauthSuccessful,
    ReauthUnsuccessful,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CannotConnect => "cannot_connect",
            ErrorCode::InvalidAuth => "invalid_auth",
            ErrorCode::Unknown => "unknown",
            ErrorCode::UnsupportedFirmware => "unsupported_firmware",
            ErrorCode::FirmwareNotFullyProvisioned => "firmware_not_fully_provisioned",
            ErrorCode::AlreadyConfigured => "already_configured",
            ErrorCode::ReauthSuccessful => "reauth_successful",
            ErrorCode::ReauthUnsuccessful => "reauth_unsuccessful",
        }
    }

    /// Whether a flow may stay in its current step and accept corrected
    /// input after reporting this code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::CannotConnect
                | ErrorCode::InvalidAuth
                | ErrorCode::Unknown
                | ErrorCode::FirmwareNotFullyProvisioned
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-side misuse of a flow.
///
/// Device-side failures never surface here; they are mapped to an
/// [`ErrorCode`] inside the owning flow. These errors mean the caller drove
/// the state machine wrong.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow has already reached a terminal state")]
    Finished,

    #[error("input is not valid in step {0}")]
    UnexpectedInput(&'static str),

    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("device options require an always-on generation 2+ device")]
    OptionsNotSupported,

    #[error("no active flow with that id")]
    UnknownFlow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::CannotConnect.as_str(), "cannot_connect");
        assert_eq!(
            ErrorCode::FirmwareNotFullyProvisioned.as_str(),
            "firmware_not_fully_provisioned"
        );
        let json = serde_json::to_string(&ErrorCode::InvalidAuth).unwrap();
        assert_eq!(json, "\"invalid_auth\"");
    }

    #[test]
    fn test_retryability() {
        assert!(ErrorCode::CannotConnect.is_retryable());
        assert!(ErrorCode::FirmwareNotFullyProvisioned.is_retryable());
        assert!(!ErrorCode::UnsupportedFirmware.is_retryable());
        assert!(!ErrorCode::AlreadyConfigured.is_retryable());
    }
}

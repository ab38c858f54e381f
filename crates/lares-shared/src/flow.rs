//! Flow wire types.
//!
//! Every suspension point of a flow hands the caller either a [`Prompt`]
//! (re-issued with an error code when a retryable step failed) or a terminal
//! [`FlowOutcome`]. Inputs arrive as [`FlowInput`] values; which variant a
//! step accepts is part of each flow's contract.

use crate::error::ErrorCode;
use crate::record::{DeviceRecord, ScannerMode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interactive steps a flow can suspend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    AddressEntry,
    ConfirmDiscovery,
    AuthChallenge,
    ReauthConfirm,
    OptionsEdit,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::AddressEntry => "address_entry",
            StepId::ConfirmDiscovery => "confirm_discovery",
            StepId::AuthChallenge => "auth_challenge",
            StepId::ReauthConfirm => "reauth_confirm",
            StepId::OptionsEdit => "options_edit",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured prompt shown to the caller at a suspension point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub step: StepId,

    /// Field names the step expects; empty for confirm-only steps.
    pub fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

/// Terminal result of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Pairing finished; the record has been handed to the store.
    Created { record: DeviceRecord },

    /// Pairing ended without a new record.
    Aborted { reason: ErrorCode },

    /// Reauth accepted the new credentials.
    Succeeded { reason: ErrorCode },

    /// Reauth gave up; the caller must restart the flow.
    Failed { reason: ErrorCode },

    /// Options flow persisted the selection.
    Saved { mode: ScannerMode },
}

/// What a flow hands back after each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowResponse {
    Prompt(Prompt),
    Done(FlowOutcome),
}

impl FlowResponse {
    pub fn prompt(step: StepId, fields: Vec<String>) -> Self {
        FlowResponse::Prompt(Prompt {
            step,
            fields,
            error: None,
        })
    }

    pub fn retry(step: StepId, fields: Vec<String>, error: ErrorCode) -> Self {
        FlowResponse::Prompt(Prompt {
            step,
            fields,
            error: Some(error),
        })
    }

    pub fn created(record: DeviceRecord) -> Self {
        FlowResponse::Done(FlowOutcome::Created { record })
    }

    pub fn aborted(reason: ErrorCode) -> Self {
        FlowResponse::Done(FlowOutcome::Aborted { reason })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowResponse::Done(_))
    }

    /// The prompt, if this response is one. Test and caller convenience.
    pub fn as_prompt(&self) -> Option<&Prompt> {
        match self {
            FlowResponse::Prompt(prompt) => Some(prompt),
            FlowResponse::Done(_) => None,
        }
    }
}

/// Caller input driving a flow forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum FlowInput {
    Address {
        host: String,
    },
    Credentials {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        password: String,
    },
    /// Confirm a discovered device as-is.
    Confirm,
    Options {
        scanner_mode: ScannerMode,
    },
}

//! Flow state machines.
//!
//! Each flow is an explicit tagged-union state machine: one step runs to
//! completion (including its awaited probe call) per `advance` call, and
//! every probe or classification failure is mapped to an [`ErrorCode`]
//! before it reaches the caller.

pub mod options;
pub mod pairing;
pub mod reauth;

use crate::probe::ProbeError;
use lares_shared::error::{ErrorCode, FlowError};
use lares_shared::record::{Credentials, Generation};

/// Username generation 2+ devices always authenticate as.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Map a probe failure to its caller-facing code.
pub(crate) fn probe_error_code(err: &ProbeError) -> ErrorCode {
    match err {
        ProbeError::ConnectionFailed(_) => ErrorCode::CannotConnect,
        ProbeError::InvalidCredentials => ErrorCode::InvalidAuth,
        ProbeError::UnsupportedFirmware => ErrorCode::UnsupportedFirmware,
        ProbeError::Unknown(_) => ErrorCode::Unknown,
    }
}

/// Fields for a credential prompt: generation 1 devices need a username,
/// generation 2+ authenticates as a fixed administrative user.
pub(crate) fn credential_fields(generation: Generation) -> Vec<String> {
    if generation.is_legacy() {
        vec!["username".to_string(), "password".to_string()]
    } else {
        vec!["password".to_string()]
    }
}

/// Resolve submitted credentials against the generation's requirements.
pub(crate) fn resolve_credentials(
    generation: Generation,
    username: Option<String>,
    password: String,
) -> Result<Credentials, FlowError> {
    let username = match username {
        Some(name) => name,
        None if generation.is_legacy() => return Err(FlowError::MissingField("username")),
        None => DEFAULT_ADMIN_USERNAME.to_string(),
    };
    Ok(Credentials { username, password })
}

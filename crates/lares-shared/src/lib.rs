//! Shared types for Lares components.
//!
//! Everything the pairing engine and the hub frontends exchange lives here:
//! persisted device records, flow prompts and outcomes, and the string error
//! codes surfaced to the UI.

pub mod error;
pub mod flow;
pub mod identity;
pub mod record;

pub use error::{ErrorCode, FlowError};
pub use flow::{FlowInput, FlowOutcome, FlowResponse, Prompt, StepId};
pub use record::{Credentials, DeviceOptions, DeviceRecord, Generation, ScannerMode};

/// Crate version, kept in sync across the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

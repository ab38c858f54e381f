//! Device pairing engine for the Lares hub.
//!
//! Implements the pairing, reauthentication, and options flows for the
//! Shelly family of local-network devices. The hub's discovery listener and
//! UI drive these flows through [`registry::FlowRegistry`]; persistence sits
//! behind the [`store::RecordStore`] trait.

pub mod classify;
pub mod config;
pub mod flow;
pub mod probe;
pub mod registry;
pub mod store;

pub use config::PairingConfig;
pub use flow::options::OptionsFlow;
pub use flow::pairing::PairingFlow;
pub use flow::reauth::ReauthFlow;
pub use probe::{DeviceProbe, HttpDeviceProbe, ProbeError, ScriptedProbe};
pub use registry::FlowRegistry;
pub use store::{MemoryRecordStore, RecordStore, StoreError};

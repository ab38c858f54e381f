//! Pairing state machine.
//!
//! Drives a device from an address (typed in or discovered) through
//! probing, an optional auth challenge, and record assembly. Suspension
//! points are the address form, the credentials form, and the discovery
//! confirm step; probing and finalizing run to completion inside a step.
//!
//! User-triggered flows keep their interactive step on retryable failures;
//! discovery-triggered flows have no address form to return to, so probe
//! failures abort instead.

use crate::classify::{self, ClassifyError, DeviceProfile};
use crate::config::PairingConfig;
use crate::flow::{credential_fields, probe_error_code, resolve_credentials};
use crate::probe::{DeviceProbe, ProbeError, RawDeviceInfo};
use crate::store::RecordStore;
use chrono::Utc;
use lares_shared::error::{ErrorCode, FlowError};
use lares_shared::flow::{FlowInput, FlowResponse, StepId};
use lares_shared::identity;
use lares_shared::record::{Credentials, DeviceOptions, DeviceRecord, Generation};
use tracing::{debug, info, warn};

/// What started this flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    User,
    Discovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairingState {
    AddressEntry,
    ConfirmDiscovery,
    AuthChallenge,
    Finished,
}

/// One pairing attempt. Exclusively owned by its registry slot; dropped on
/// the terminal transition.
pub struct PairingFlow {
    trigger: Trigger,
    state: PairingState,
    host: Option<String>,
    name_hint: Option<String>,
    info: Option<RawDeviceInfo>,
    /// Profile validated ahead of the discovery confirm step.
    profile: Option<DeviceProfile>,
}

impl PairingFlow {
    /// User-initiated pairing: prompt for an address first.
    pub fn start_user() -> (Self, FlowResponse) {
        let flow = Self {
            trigger: Trigger::User,
            state: PairingState::AddressEntry,
            host: None,
            name_hint: None,
            info: None,
            profile: None,
        };
        let response = FlowResponse::prompt(StepId::AddressEntry, address_fields());
        (flow, response)
    }

    /// Discovery-initiated pairing: the address is already known, probe
    /// immediately. Idempotent per identity: re-triggering for a stored
    /// device converges on `already_configured`.
    pub async fn start_discovery(
        probe: &dyn DeviceProbe,
        store: &dyn RecordStore,
        config: &PairingConfig,
        host: String,
        name_hint: Option<String>,
    ) -> (Self, FlowResponse) {
        let mut flow = Self {
            trigger: Trigger::Discovery,
            state: PairingState::AddressEntry,
            host: None,
            name_hint,
            info: None,
            profile: None,
        };
        let response = flow.probe_step(probe, store, config, host).await;
        (flow, response)
    }

    /// Feed the next caller input into the machine.
    pub async fn advance(
        &mut self,
        probe: &dyn DeviceProbe,
        store: &dyn RecordStore,
        config: &PairingConfig,
        input: FlowInput,
    ) -> Result<FlowResponse, FlowError> {
        match (self.state, input) {
            (PairingState::Finished, _) => Err(FlowError::Finished),

            (PairingState::AddressEntry, FlowInput::Address { host }) => {
                Ok(self.probe_step(probe, store, config, host).await)
            }
            (PairingState::AddressEntry, _) => Err(FlowError::UnexpectedInput("address_entry")),

            (PairingState::AuthChallenge, FlowInput::Credentials { username, password }) => {
                let credentials = resolve_credentials(self.generation(), username, password)?;
                Ok(self.auth_step(probe, store, credentials).await)
            }
            (PairingState::AuthChallenge, _) => Err(FlowError::UnexpectedInput("auth_challenge")),

            (PairingState::ConfirmDiscovery, FlowInput::Confirm) => {
                Ok(self.confirm_step(probe, store).await)
            }
            (PairingState::ConfirmDiscovery, _) => {
                Err(FlowError::UnexpectedInput("confirm_discovery"))
            }
        }
    }

    /// Probing: identity fetch, duplicate resolution, auth gating.
    async fn probe_step(
        &mut self,
        probe: &dyn DeviceProbe,
        store: &dyn RecordStore,
        config: &PairingConfig,
        host: String,
    ) -> FlowResponse {
        debug!("Probing device at {}", host);
        let info = match probe.get_info(&host).await {
            Ok(info) => info,
            Err(ProbeError::UnsupportedFirmware) => {
                return self.abort(ErrorCode::UnsupportedFirmware);
            }
            Err(err) => {
                warn!("Device probe at {} failed: {}", host, err);
                return self.address_failure(probe_error_code(&err));
            }
        };

        // A stored identity converges on the existing record: refresh its
        // host and stop, never create a second record. The device's own AP
        // address is not a reachable long-term host and must not replace a
        // previously stored one.
        let identity = identity::key_from_name(self.name_hint.as_deref().unwrap_or(""))
            .or_else(|| identity::normalize_key(&info.mac));
        if let Some(key) = &identity {
            match store.find_by_identity(key).await {
                Ok(Some(mut existing)) => {
                    if host != config.ap_fallback_ip && existing.host != host {
                        info!("Device {} reappeared at {}, refreshing host", key, host);
                        existing.host = host.clone();
                        if let Err(err) = store.upsert(existing).await {
                            warn!("Host refresh for {} failed: {}", key, err);
                            return self.address_failure(ErrorCode::Unknown);
                        }
                    }
                    return self.abort(ErrorCode::AlreadyConfigured);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Identity lookup for {} failed: {}", key, err);
                    return self.address_failure(ErrorCode::Unknown);
                }
            }
        }

        // An unknown device offering only its AP self-address cannot be
        // paired at a usable host.
        if host == config.ap_fallback_ip {
            return self.address_failure(ErrorCode::CannotConnect);
        }

        self.host = Some(host);
        let requires_auth = info.requires_auth;
        self.info = Some(info);
        let generation = self.generation();

        if requires_auth {
            self.state = PairingState::AuthChallenge;
            return FlowResponse::prompt(StepId::AuthChallenge, credential_fields(generation));
        }

        match self.validate(probe, None).await {
            Ok(profile) => match self.trigger {
                Trigger::User => self.finalize(store, profile, None).await,
                Trigger::Discovery => {
                    self.profile = Some(profile);
                    self.state = PairingState::ConfirmDiscovery;
                    FlowResponse::prompt(StepId::ConfirmDiscovery, vec![])
                }
            },
            Err(ErrorCode::FirmwareNotFullyProvisioned) if self.trigger == Trigger::Discovery => {
                // Provisioning may complete before the user confirms;
                // the confirm step re-validates.
                self.state = PairingState::ConfirmDiscovery;
                FlowResponse::retry(
                    StepId::ConfirmDiscovery,
                    vec![],
                    ErrorCode::FirmwareNotFullyProvisioned,
                )
            }
            Err(ErrorCode::UnsupportedFirmware) => self.abort(ErrorCode::UnsupportedFirmware),
            Err(code) => self.address_failure(code),
        }
    }

    /// Auth challenge: connect with the submitted credentials, retry in
    /// place on rejection.
    async fn auth_step(
        &mut self,
        probe: &dyn DeviceProbe,
        store: &dyn RecordStore,
        credentials: Credentials,
    ) -> FlowResponse {
        match self.validate(probe, Some(&credentials)).await {
            Ok(profile) => self.finalize(store, profile, Some(credentials)).await,
            Err(ErrorCode::UnsupportedFirmware) => self.abort(ErrorCode::UnsupportedFirmware),
            Err(code) => FlowResponse::retry(
                StepId::AuthChallenge,
                credential_fields(self.generation()),
                code,
            ),
        }
    }

    /// Discovery confirm: finalize the validated profile, or re-validate
    /// when the first pass saw unfinished provisioning.
    async fn confirm_step(
        &mut self,
        probe: &dyn DeviceProbe,
        store: &dyn RecordStore,
    ) -> FlowResponse {
        if let Some(profile) = self.profile.clone() {
            return self.finalize(store, profile, None).await;
        }
        match self.validate(probe, None).await {
            Ok(profile) => self.finalize(store, profile, None).await,
            Err(ErrorCode::FirmwareNotFullyProvisioned) => FlowResponse::retry(
                StepId::ConfirmDiscovery,
                vec![],
                ErrorCode::FirmwareNotFullyProvisioned,
            ),
            Err(code) => self.abort(code),
        }
    }

    /// Connect and classify, mapping every failure to an error code.
    async fn validate(
        &self,
        probe: &dyn DeviceProbe,
        credentials: Option<&Credentials>,
    ) -> Result<DeviceProfile, ErrorCode> {
        let (Some(info), Some(host)) = (self.info.as_ref(), self.host.as_deref()) else {
            return Err(ErrorCode::Unknown);
        };
        let generation = classify::generation_of(info).map_err(|_| ErrorCode::Unknown)?;
        let session = probe
            .connect(host, generation, credentials)
            .await
            .map_err(|err| {
                warn!("Device connect at {} failed: {}", host, err);
                probe_error_code(&err)
            })?;
        classify::classify(info, &session).map_err(|err| match err {
            ClassifyError::ModelKeyMissing => ErrorCode::FirmwareNotFullyProvisioned,
            ClassifyError::UnsupportedGeneration(_) => ErrorCode::Unknown,
        })
    }

    /// Finalizing: assemble the record and hand it to the store.
    async fn finalize(
        &mut self,
        store: &dyn RecordStore,
        profile: DeviceProfile,
        credentials: Option<Credentials>,
    ) -> FlowResponse {
        let identity = identity::key_from_name(self.name_hint.as_deref().unwrap_or(""))
            .or_else(|| {
                self.info
                    .as_ref()
                    .and_then(|info| identity::normalize_key(&info.mac))
            });
        let (Some(identity), Some(host)) = (identity, self.host.clone()) else {
            warn!("Device offered no usable identity key, cannot finalize");
            return self.stay_current(ErrorCode::Unknown);
        };

        let mut record = DeviceRecord {
            identity,
            host,
            model: profile.model,
            generation: profile.generation,
            sleep_period: profile.sleep_period,
            username: None,
            password: None,
            options: DeviceOptions::default(),
            paired_at: Utc::now(),
        };
        if let Some(credentials) = credentials {
            record.set_credentials(credentials);
        }

        if let Err(err) = store.upsert(record.clone()).await {
            warn!("Record upsert for {} failed: {}", record.identity, err);
            return self.stay_current(ErrorCode::Unknown);
        }

        info!(
            "Paired gen {} device {} ({}) at {}",
            record.generation, record.identity, record.model, record.host
        );
        self.state = PairingState::Finished;
        FlowResponse::created(record)
    }

    /// Retryable failure reported from whatever interactive step the flow
    /// is suspended on.
    fn stay_current(&mut self, code: ErrorCode) -> FlowResponse {
        match self.state {
            PairingState::AuthChallenge => FlowResponse::retry(
                StepId::AuthChallenge,
                credential_fields(self.generation()),
                code,
            ),
            PairingState::ConfirmDiscovery => {
                FlowResponse::retry(StepId::ConfirmDiscovery, vec![], code)
            }
            _ => self.address_failure(code),
        }
    }

    /// Retryable failure before any interactive step exists: user flows
    /// re-issue the address form, discovery flows abort (no step to return
    /// to).
    fn address_failure(&mut self, code: ErrorCode) -> FlowResponse {
        match self.trigger {
            Trigger::User => {
                FlowResponse::retry(StepId::AddressEntry, address_fields(), code)
            }
            Trigger::Discovery => self.abort(code),
        }
    }

    fn abort(&mut self, reason: ErrorCode) -> FlowResponse {
        debug!("Pairing flow aborted: {}", reason);
        self.state = PairingState::Finished;
        FlowResponse::aborted(reason)
    }

    fn generation(&self) -> Generation {
        self.info
            .as_ref()
            .and_then(|info| info.gen)
            .and_then(|gen| Generation::try_from(gen).ok())
            .unwrap_or(Generation::Gen1)
    }

    pub fn is_finished(&self) -> bool {
        self.state == PairingState::Finished
    }
}

fn address_fields() -> Vec<String> {
    vec!["host".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ScriptedProbe;
    use crate::store::MemoryRecordStore;

    #[test]
    fn test_start_user_prompts_for_address() {
        let (flow, response) = PairingFlow::start_user();
        let prompt = response.as_prompt().unwrap();
        assert_eq!(prompt.step, StepId::AddressEntry);
        assert_eq!(prompt.fields, ["host"]);
        assert!(prompt.error.is_none());
        assert!(!flow.is_finished());
    }

    #[tokio::test]
    async fn test_wrong_input_kind_is_caller_error() {
        let (mut flow, _) = PairingFlow::start_user();
        let probe = ScriptedProbe::new();
        let store = MemoryRecordStore::new();
        let config = PairingConfig::default();

        let result = flow
            .advance(&probe, &store, &config, FlowInput::Confirm)
            .await;
        assert!(matches!(result, Err(FlowError::UnexpectedInput(_))));
    }
}

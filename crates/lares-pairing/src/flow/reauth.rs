//! Reauthentication state machine.
//!
//! Entered when a paired device starts rejecting its stored credentials.
//! One interactive step collects replacements; any probe or connect failure
//! is terminal — the caller restarts the flow rather than retrying in place.

use crate::flow::{credential_fields, resolve_credentials};
use crate::probe::DeviceProbe;
use crate::store::RecordStore;
use lares_shared::error::{ErrorCode, FlowError};
use lares_shared::flow::{FlowInput, FlowOutcome, FlowResponse, StepId};
use lares_shared::record::DeviceRecord;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReauthState {
    ConfirmCredentials,
    Finished,
}

pub struct ReauthFlow {
    record: DeviceRecord,
    state: ReauthState,
}

impl ReauthFlow {
    pub fn start(record: DeviceRecord) -> (Self, FlowResponse) {
        let fields = credential_fields(record.generation);
        let flow = Self {
            record,
            state: ReauthState::ConfirmCredentials,
        };
        (flow, FlowResponse::prompt(StepId::ReauthConfirm, fields))
    }

    pub async fn advance(
        &mut self,
        probe: &dyn DeviceProbe,
        store: &dyn RecordStore,
        input: FlowInput,
    ) -> Result<FlowResponse, FlowError> {
        match (self.state, input) {
            (ReauthState::Finished, _) => Err(FlowError::Finished),

            (ReauthState::ConfirmCredentials, FlowInput::Credentials { username, password }) => {
                let credentials =
                    resolve_credentials(self.record.generation, username, password)?;
                self.state = ReauthState::Finished;

                // The identity probe and the authenticated connect both have
                // to succeed with the stored generation; any failure ends
                // the flow.
                if let Err(err) = probe.get_info(&self.record.host).await {
                    warn!("Reauth probe of {} failed: {}", self.record.identity, err);
                    return Ok(failed());
                }
                if let Err(err) = probe
                    .connect(&self.record.host, self.record.generation, Some(&credentials))
                    .await
                {
                    warn!("Reauth connect to {} failed: {}", self.record.identity, err);
                    return Ok(failed());
                }

                self.record.set_credentials(credentials);
                if let Err(err) = store.upsert(self.record.clone()).await {
                    warn!(
                        "Credential update for {} failed: {}",
                        self.record.identity, err
                    );
                    return Ok(failed());
                }

                info!("Reauthenticated device {}", self.record.identity);
                Ok(FlowResponse::Done(FlowOutcome::Succeeded {
                    reason: ErrorCode::ReauthSuccessful,
                }))
            }
            (ReauthState::ConfirmCredentials, _) => {
                Err(FlowError::UnexpectedInput("reauth_confirm"))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == ReauthState::Finished
    }
}

fn failed() -> FlowResponse {
    FlowResponse::Done(FlowOutcome::Failed {
        reason: ErrorCode::ReauthUnsuccessful,
    })
}

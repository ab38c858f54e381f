//! Options state machine.
//!
//! Post-pairing secondary configuration: the scanner mode of the device's
//! extra radio. Only always-on generation 2+ devices can take the follow-up
//! configuration push, so entry is capability-gated.

use crate::probe::DeviceProbe;
use crate::store::RecordStore;
use lares_shared::error::{ErrorCode, FlowError};
use lares_shared::flow::{FlowInput, FlowOutcome, FlowResponse, StepId};
use lares_shared::record::DeviceRecord;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionsState {
    Edit,
    Finished,
}

pub struct OptionsFlow {
    record: DeviceRecord,
    state: OptionsState,
}

impl OptionsFlow {
    /// Gate: generation >= 2 and always-on, otherwise entry fails.
    pub fn start(record: DeviceRecord) -> Result<(Self, FlowResponse), FlowError> {
        if !record.supports_options() {
            return Err(FlowError::OptionsNotSupported);
        }
        let flow = Self {
            record,
            state: OptionsState::Edit,
        };
        let response =
            FlowResponse::prompt(StepId::OptionsEdit, vec!["scanner_mode".to_string()]);
        Ok((flow, response))
    }

    pub async fn advance(
        &mut self,
        _probe: &dyn DeviceProbe,
        store: &dyn RecordStore,
        input: FlowInput,
    ) -> Result<FlowResponse, FlowError> {
        match (self.state, input) {
            (OptionsState::Finished, _) => Err(FlowError::Finished),

            (OptionsState::Edit, FlowInput::Options { scanner_mode }) => {
                self.record.options.scanner_mode = Some(scanner_mode);
                if let Err(err) = store.upsert(self.record.clone()).await {
                    warn!(
                        "Options save for {} failed: {}",
                        self.record.identity, err
                    );
                    return Ok(FlowResponse::retry(
                        StepId::OptionsEdit,
                        vec!["scanner_mode".to_string()],
                        ErrorCode::Unknown,
                    ));
                }
                info!(
                    "Saved scanner mode {} for {}",
                    scanner_mode, self.record.identity
                );
                self.state = OptionsState::Finished;
                Ok(FlowResponse::Done(FlowOutcome::Saved { mode: scanner_mode }))
            }
            (OptionsState::Edit, _) => Err(FlowError::UnexpectedInput("options_edit")),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == OptionsState::Finished
    }
}

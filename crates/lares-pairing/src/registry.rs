//! Flow registry.
//!
//! The session-store collaborator holding live flow instances keyed by an
//! opaque id. A flow is taken out of the table while it advances, so no two
//! steps of the same instance can run concurrently; independent flows run
//! side by side. Terminal flows are dropped instead of being re-inserted.

use crate::config::PairingConfig;
use crate::flow::options::OptionsFlow;
use crate::flow::pairing::PairingFlow;
use crate::flow::reauth::ReauthFlow;
use crate::probe::DeviceProbe;
use crate::store::RecordStore;
use lares_shared::error::FlowError;
use lares_shared::flow::{FlowInput, FlowResponse};
use lares_shared::record::DeviceRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

enum FlowKind {
    Pairing(PairingFlow),
    Reauth(ReauthFlow),
    Options(OptionsFlow),
}

impl FlowKind {
    fn is_finished(&self) -> bool {
        match self {
            FlowKind::Pairing(flow) => flow.is_finished(),
            FlowKind::Reauth(flow) => flow.is_finished(),
            FlowKind::Options(flow) => flow.is_finished(),
        }
    }
}

pub struct FlowRegistry {
    probe: Arc<dyn DeviceProbe>,
    store: Arc<dyn RecordStore>,
    config: PairingConfig,
    flows: Mutex<HashMap<Uuid, FlowKind>>,
}

impl FlowRegistry {
    pub fn new(
        probe: Arc<dyn DeviceProbe>,
        store: Arc<dyn RecordStore>,
        config: PairingConfig,
    ) -> Self {
        Self {
            probe,
            store,
            config,
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// User-initiated pairing.
    pub async fn start_user(&self) -> (Uuid, FlowResponse) {
        let (flow, response) = PairingFlow::start_user();
        let id = self.register(FlowKind::Pairing(flow)).await;
        (id, response)
    }

    /// Discovery-initiated pairing; may terminate immediately (duplicate,
    /// unreachable, unsupported), in which case no flow is retained.
    pub async fn start_discovery(
        &self,
        host: String,
        name_hint: Option<String>,
    ) -> (Uuid, FlowResponse) {
        let (flow, response) = PairingFlow::start_discovery(
            self.probe.as_ref(),
            self.store.as_ref(),
            &self.config,
            host,
            name_hint,
        )
        .await;
        let id = self.register(FlowKind::Pairing(flow)).await;
        (id, response)
    }

    /// Credential recovery for an existing record.
    pub async fn start_reauth(&self, record: DeviceRecord) -> (Uuid, FlowResponse) {
        let (flow, response) = ReauthFlow::start(record);
        let id = self.register(FlowKind::Reauth(flow)).await;
        (id, response)
    }

    /// Secondary options for an existing record; fails the capability gate
    /// for legacy or sleeping devices.
    pub async fn start_options(
        &self,
        record: DeviceRecord,
    ) -> Result<(Uuid, FlowResponse), FlowError> {
        let (flow, response) = OptionsFlow::start(record)?;
        let id = self.register(FlowKind::Options(flow)).await;
        Ok((id, response))
    }

    /// Drive the identified flow one step.
    pub async fn advance(&self, id: Uuid, input: FlowInput) -> Result<FlowResponse, FlowError> {
        // Taken out of the table for the duration of the step.
        let mut flow = self
            .flows
            .lock()
            .await
            .remove(&id)
            .ok_or(FlowError::UnknownFlow)?;

        let result = match &mut flow {
            FlowKind::Pairing(pairing) => {
                pairing
                    .advance(
                        self.probe.as_ref(),
                        self.store.as_ref(),
                        &self.config,
                        input,
                    )
                    .await
            }
            FlowKind::Reauth(reauth) => {
                reauth
                    .advance(self.probe.as_ref(), self.store.as_ref(), input)
                    .await
            }
            FlowKind::Options(options) => {
                options
                    .advance(self.probe.as_ref(), self.store.as_ref(), input)
                    .await
            }
        };

        if !flow.is_finished() {
            self.flows.lock().await.insert(id, flow);
        } else {
            debug!("Flow {} finished", id);
        }
        result
    }

    /// Abandon a flow. Nothing to roll back: records are written only when
    /// a flow finalizes.
    pub async fn cancel(&self, id: Uuid) -> bool {
        self.flows.lock().await.remove(&id).is_some()
    }

    pub async fn active_count(&self) -> usize {
        self.flows.lock().await.len()
    }

    async fn register(&self, flow: FlowKind) -> Uuid {
        let id = Uuid::new_v4();
        if !flow.is_finished() {
            self.flows.lock().await.insert(id, flow);
        }
        id
    }
}

//! Golden tests for the reauth and options flows.

use std::sync::Arc;

use lares_pairing::probe::{DeviceSession, ProbeError, RawDeviceInfo, ScriptedProbe};
use lares_pairing::store::{MemoryRecordStore, RecordStore};
use lares_pairing::{FlowRegistry, PairingConfig};
use lares_shared::error::{ErrorCode, FlowError};
use lares_shared::flow::{FlowInput, FlowOutcome, FlowResponse, StepId};
use lares_shared::record::{DeviceOptions, DeviceRecord, Generation, ScannerMode};

const MODEL_1: &str = "SHSW-1";

fn setup() -> (Arc<ScriptedProbe>, Arc<MemoryRecordStore>, FlowRegistry) {
    let probe = Arc::new(ScriptedProbe::new());
    let store = Arc::new(MemoryRecordStore::new());
    let registry = FlowRegistry::new(probe.clone(), store.clone(), PairingConfig::default());
    (probe, store, registry)
}

fn paired_record(gen: u8, sleep_period: u32) -> DeviceRecord {
    DeviceRecord {
        identity: "AABBCCDDEEFF".to_string(),
        host: "0.0.0.0".to_string(),
        model: MODEL_1.to_string(),
        generation: Generation::try_from(gen).unwrap(),
        sleep_period,
        username: None,
        password: None,
        options: DeviceOptions::default(),
        paired_at: chrono::Utc::now(),
    }
}

fn plain_info() -> RawDeviceInfo {
    RawDeviceInfo {
        mac: "AABBCCDDEEFF".to_string(),
        requires_auth: true,
        ..Default::default()
    }
}

fn credentials(username: Option<&str>, password: &str) -> FlowInput {
    FlowInput::Credentials {
        username: username.map(str::to_string),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn test_reauth_successful_each_generation() {
    for (gen, username, expected_username) in [
        (1u8, Some("test user"), "test user"),
        (2, None, "admin"),
        (3, None, "admin"),
    ] {
        let (probe, store, registry) = setup();
        let record = paired_record(gen, 0);
        store.upsert(record.clone()).await.unwrap();
        probe.push_info(Ok(plain_info()));
        probe.push_connect(Ok(DeviceSession::default()));

        let (id, response) = registry.start_reauth(record).await;
        let prompt = response.as_prompt().unwrap();
        assert_eq!(prompt.step, StepId::ReauthConfirm);

        let response = registry
            .advance(id, credentials(username, "new password"))
            .await
            .unwrap();
        assert_eq!(
            response,
            FlowResponse::Done(FlowOutcome::Succeeded {
                reason: ErrorCode::ReauthSuccessful
            })
        );

        // Stored credentials were replaced, connect used the stored gen.
        let stored = store.find_by_identity("AABBCCDDEEFF").await.unwrap().unwrap();
        assert_eq!(stored.username.as_deref(), Some(expected_username));
        assert_eq!(stored.password.as_deref(), Some("new password"));
        let call = probe.connect_calls().pop().unwrap();
        assert_eq!(call.generation.as_u8(), gen);
    }
}

#[tokio::test]
async fn test_reauth_rejected_credentials_terminal() {
    let (probe, store, registry) = setup();
    let record = paired_record(2, 0);
    store.upsert(record.clone()).await.unwrap();
    probe.push_info(Ok(plain_info()));
    probe.push_connect(Err(ProbeError::InvalidCredentials));

    let (id, _) = registry.start_reauth(record).await;
    let response = registry
        .advance(id, credentials(None, "bad password"))
        .await
        .unwrap();
    assert_eq!(
        response,
        FlowResponse::Done(FlowOutcome::Failed {
            reason: ErrorCode::ReauthUnsuccessful
        })
    );

    // Terminal: no in-place retry, credentials untouched.
    let result = registry.advance(id, credentials(None, "again")).await;
    assert!(matches!(result, Err(FlowError::UnknownFlow)));
    let stored = store.find_by_identity("AABBCCDDEEFF").await.unwrap().unwrap();
    assert!(stored.password.is_none());
}

#[tokio::test]
async fn test_reauth_probe_failures_terminal() {
    for err in [
        ProbeError::ConnectionFailed("down".into()),
        ProbeError::UnsupportedFirmware,
        ProbeError::Unknown("boom".into()),
    ] {
        let (probe, store, registry) = setup();
        let record = paired_record(2, 0);
        store.upsert(record.clone()).await.unwrap();
        probe.push_info(Err(err));

        let (id, _) = registry.start_reauth(record).await;
        let response = registry
            .advance(id, credentials(None, "new password"))
            .await
            .unwrap();
        assert_eq!(
            response,
            FlowResponse::Done(FlowOutcome::Failed {
                reason: ErrorCode::ReauthUnsuccessful
            })
        );
    }
}

#[tokio::test]
async fn test_reauth_gen1_requires_username() {
    let (_probe, _store, registry) = setup();
    let (id, _) = registry.start_reauth(paired_record(1, 0)).await;
    let result = registry.advance(id, credentials(None, "pw")).await;
    assert!(matches!(result, Err(FlowError::MissingField("username"))));
    assert_eq!(registry.active_count().await, 1);
}

#[tokio::test]
async fn test_options_gate() {
    let (_probe, _store, registry) = setup();

    // Legacy and sleeping devices cannot take the follow-up push.
    let result = registry.start_options(paired_record(1, 0)).await;
    assert!(matches!(result, Err(FlowError::OptionsNotSupported)));
    let result = registry.start_options(paired_record(2, 600)).await;
    assert!(matches!(result, Err(FlowError::OptionsNotSupported)));

    let (_, response) = registry.start_options(paired_record(2, 0)).await.unwrap();
    let prompt = response.as_prompt().unwrap();
    assert_eq!(prompt.step, StepId::OptionsEdit);
    assert_eq!(prompt.fields, ["scanner_mode"]);
}

#[tokio::test]
async fn test_options_saves_each_mode() {
    for mode in [
        ScannerMode::Disabled,
        ScannerMode::Active,
        ScannerMode::Passive,
    ] {
        let (_probe, store, registry) = setup();
        let record = paired_record(2, 0);
        store.upsert(record.clone()).await.unwrap();

        let (id, _) = registry.start_options(record).await.unwrap();
        let response = registry
            .advance(id, FlowInput::Options { scanner_mode: mode })
            .await
            .unwrap();
        assert_eq!(response, FlowResponse::Done(FlowOutcome::Saved { mode }));

        let stored = store.find_by_identity("AABBCCDDEEFF").await.unwrap().unwrap();
        assert_eq!(stored.options.scanner_mode, Some(mode));
    }
}

#[tokio::test]
async fn test_options_resave_overwrites() {
    let (_probe, store, registry) = setup();
    let record = paired_record(3, 0);
    store.upsert(record.clone()).await.unwrap();

    let (id, _) = registry.start_options(record.clone()).await.unwrap();
    registry
        .advance(
            id,
            FlowInput::Options {
                scanner_mode: ScannerMode::Disabled,
            },
        )
        .await
        .unwrap();

    let updated = store.find_by_identity("AABBCCDDEEFF").await.unwrap().unwrap();
    let (id, _) = registry.start_options(updated).await.unwrap();
    registry
        .advance(
            id,
            FlowInput::Options {
                scanner_mode: ScannerMode::Active,
            },
        )
        .await
        .unwrap();

    let stored = store.find_by_identity("AABBCCDDEEFF").await.unwrap().unwrap();
    assert_eq!(stored.options.scanner_mode, Some(ScannerMode::Active));
}

#[tokio::test]
async fn test_options_wrong_input_kind() {
    let (_probe, _store, registry) = setup();
    let (id, _) = registry.start_options(paired_record(2, 0)).await.unwrap();
    let result = registry.advance(id, FlowInput::Confirm).await;
    assert!(matches!(result, Err(FlowError::UnexpectedInput("options_edit"))));
}

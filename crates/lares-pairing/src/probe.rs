//! Device probing.
//!
//! A [`DeviceProbe`] wraps the two capabilities the flows need against a
//! single address: fetch identity info, and open an authenticated session.
//! It is stateless request/response; retry policy belongs to the flows.
//!
//! Production code uses [`HttpDeviceProbe`] against the device's local HTTP
//! API. Test code uses [`ScriptedProbe`] with pre-configured responses so no
//! network is required.

use crate::config::PairingConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lares_shared::record::{Credentials, Generation};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Oldest generation-1 firmware the hub still pairs with, as a yyyymmdd
/// build date. Older builds lack the CoIoT settings the integration needs.
const GEN1_MIN_FIRMWARE_DATE: u32 = 20201124;

/// Probe failure modes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("device connection failed: {0}")]
    ConnectionFailed(String),

    #[error("device rejected the credentials")]
    InvalidCredentials,

    #[error("device firmware is below the supported floor")]
    UnsupportedFirmware,

    #[error("unexpected probe failure: {0}")]
    Unknown(String),
}

/// Identity payload from the device's unauthenticated info endpoint.
///
/// Generation 1 firmware reports the model under `type`, generation 2+
/// under `model`. Some firmware emits `gen` as a string, so parsing accepts
/// both forms.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDeviceInfo {
    #[serde(default)]
    pub mac: String,

    #[serde(rename = "type", default)]
    pub legacy_model: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default, deserialize_with = "de_generation")]
    pub gen: Option<u8>,

    #[serde(rename = "auth", default)]
    pub requires_auth: bool,

    #[serde(default)]
    pub sleep_mode: bool,

    /// Raw firmware version string, generation-1 builds lead with yyyymmdd.
    #[serde(default)]
    pub fw: Option<String>,
}

impl RawDeviceInfo {
    pub fn model_hint(&self) -> Option<&str> {
        self.model.as_deref().or(self.legacy_model.as_deref())
    }
}

fn de_generation<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| Some(v as u8))
            .ok_or_else(|| serde::de::Error::custom("gen is not an unsigned integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u8>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unexpected gen value: {other}"
        ))),
    }
}

/// Sleep-mode unit reported by generation-1 settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SleepUnit {
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
}

/// Generation-1 sleep settings, in the device's own unit.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SleepSettings {
    pub period: u32,
    pub unit: SleepUnit,
}

/// What a successful connect exposes to classification.
#[derive(Debug, Clone, Default)]
pub struct DeviceSession {
    /// Canonical model key; absent on firmware that has not finished
    /// provisioning.
    pub model: Option<String>,

    /// Generation-1 sleep settings, when the device sleeps.
    pub sleep: Option<SleepSettings>,

    /// Generation-2+ wakeup period in seconds.
    pub wakeup_period: Option<u32>,
}

/// Probe capability against a single device address.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// Fetch the unauthenticated identity payload.
    async fn get_info(&self, host: &str) -> Result<RawDeviceInfo, ProbeError>;

    /// Open a device session, authenticating when credentials are given.
    async fn connect(
        &self,
        host: &str,
        generation: Generation,
        credentials: Option<&Credentials>,
    ) -> Result<DeviceSession, ProbeError>;
}

// ============================================================================
// HTTP probe (production)
// ============================================================================

/// Probe over the device's local HTTP API.
pub struct HttpDeviceProbe {
    http: reqwest::Client,
    port: u16,
}

impl HttpDeviceProbe {
    pub fn new(config: &PairingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("Failed to build device HTTP client")?;
        Ok(Self {
            http,
            port: config.device_port,
        })
    }

    fn url(&self, host: &str, path: &str) -> String {
        format!("http://{}:{}/{}", host, self.port, path)
    }

    async fn fetch_json(
        &self,
        host: &str,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Value, ProbeError> {
        let mut request = self.http.get(self.url(host, path));
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send().await.map_err(map_transport)?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProbeError::InvalidCredentials);
        }
        if !response.status().is_success() {
            return Err(ProbeError::Unknown(format!(
                "device returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ProbeError::Unknown(e.to_string()))
    }

    async fn rpc_call(
        &self,
        host: &str,
        method: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Value, ProbeError> {
        let mut request = self
            .http
            .post(self.url(host, "rpc"))
            .json(&json!({ "id": 0, "method": method }));
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send().await.map_err(map_transport)?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProbeError::InvalidCredentials);
        }
        if !response.status().is_success() {
            return Err(ProbeError::Unknown(format!(
                "rpc {} returned {}",
                method,
                response.status()
            )));
        }
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| ProbeError::Unknown(e.to_string()))?;
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl DeviceProbe for HttpDeviceProbe {
    async fn get_info(&self, host: &str) -> Result<RawDeviceInfo, ProbeError> {
        debug!("Probing device info at {}", host);
        let payload = self.fetch_json(host, "shelly", None).await?;
        let info: RawDeviceInfo =
            serde_json::from_value(payload).map_err(|e| ProbeError::Unknown(e.to_string()))?;
        if !firmware_supported(&info) {
            return Err(ProbeError::UnsupportedFirmware);
        }
        Ok(info)
    }

    async fn connect(
        &self,
        host: &str,
        generation: Generation,
        credentials: Option<&Credentials>,
    ) -> Result<DeviceSession, ProbeError> {
        debug!("Connecting to gen {} device at {}", generation, host);
        if generation.is_legacy() {
            let settings = self.fetch_json(host, "settings", credentials).await?;
            let model = settings
                .pointer("/device/type")
                .and_then(Value::as_str)
                .map(str::to_string);
            let sleep = settings
                .get("sleep_mode")
                .cloned()
                .and_then(|v| serde_json::from_value::<SleepSettings>(v).ok());
            return Ok(DeviceSession {
                model,
                sleep,
                wakeup_period: None,
            });
        }

        let device_info = self
            .rpc_call(host, "Shelly.GetDeviceInfo", credentials)
            .await?;
        let status = self.rpc_call(host, "Shelly.GetStatus", credentials).await?;
        Ok(DeviceSession {
            model: device_info
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
            sleep: None,
            wakeup_period: status
                .pointer("/sys/wakeup_period")
                .and_then(Value::as_u64)
                .map(|v| v as u32),
        })
    }
}

fn map_transport(err: reqwest::Error) -> ProbeError {
    if err.is_connect() || err.is_timeout() {
        ProbeError::ConnectionFailed(err.to_string())
    } else {
        ProbeError::Unknown(err.to_string())
    }
}

/// Generation-1 firmware carries its build date up front; anything older
/// than the floor cannot be paired. Generation 2+ has no date floor here.
fn firmware_supported(info: &RawDeviceInfo) -> bool {
    if info.gen.unwrap_or(1) >= 2 {
        return true;
    }
    match info.fw.as_deref().and_then(|fw| fw.get(..8)?.parse::<u32>().ok()) {
        Some(date) => date >= GEN1_MIN_FIRMWARE_DATE,
        None => true,
    }
}

// ============================================================================
// Scripted probe (tests)
// ============================================================================

/// A connect call as observed by [`ScriptedProbe`].
#[derive(Debug, Clone)]
pub struct ConnectCall {
    pub host: String,
    pub generation: Generation,
    pub credentials: Option<Credentials>,
}

/// Probe fake driven by queued responses.
///
/// Responses are consumed in order; the final one repeats so a flow may
/// re-run a step without re-scripting. Connect calls are recorded for
/// assertions on generation and credential handling.
#[derive(Default)]
pub struct ScriptedProbe {
    info_results: Mutex<ScriptQueue<RawDeviceInfo>>,
    connect_results: Mutex<ScriptQueue<DeviceSession>>,
    connect_calls: Mutex<Vec<ConnectCall>>,
}

#[derive(Default)]
struct ScriptQueue<T> {
    pending: VecDeque<Result<T, ProbeError>>,
    last: Option<Result<T, ProbeError>>,
}

impl<T: Clone> ScriptQueue<T> {
    fn next(&mut self) -> Result<T, ProbeError> {
        if let Some(result) = self.pending.pop_front() {
            self.last = Some(result.clone());
            return result;
        }
        self.last
            .clone()
            .unwrap_or_else(|| Err(ProbeError::Unknown("scripted probe exhausted".into())))
    }
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_info(&self, result: Result<RawDeviceInfo, ProbeError>) {
        self.info_results.lock().unwrap().pending.push_back(result);
    }

    pub fn push_connect(&self, result: Result<DeviceSession, ProbeError>) {
        self.connect_results.lock().unwrap().pending.push_back(result);
    }

    pub fn connect_calls(&self) -> Vec<ConnectCall> {
        self.connect_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceProbe for ScriptedProbe {
    async fn get_info(&self, _host: &str) -> Result<RawDeviceInfo, ProbeError> {
        self.info_results.lock().unwrap().next()
    }

    async fn connect(
        &self,
        host: &str,
        generation: Generation,
        credentials: Option<&Credentials>,
    ) -> Result<DeviceSession, ProbeError> {
        self.connect_calls.lock().unwrap().push(ConnectCall {
            host: host.to_string(),
            generation,
            credentials: credentials.cloned(),
        });
        self.connect_results.lock().unwrap().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_parses_gen_as_number_or_string() {
        let info: RawDeviceInfo =
            serde_json::from_str(r#"{"mac":"test-mac","auth":false,"gen":2}"#).unwrap();
        assert_eq!(info.gen, Some(2));

        let info: RawDeviceInfo =
            serde_json::from_str(r#"{"mac":"test-mac","auth":false,"gen":"2"}"#).unwrap();
        assert_eq!(info.gen, Some(2));

        let info: RawDeviceInfo = serde_json::from_str(r#"{"mac":"test-mac"}"#).unwrap();
        assert_eq!(info.gen, None);
        assert!(!info.requires_auth);
    }

    #[test]
    fn test_info_model_hint_prefers_rpc_key() {
        let info: RawDeviceInfo = serde_json::from_str(
            r#"{"mac":"m","type":"SHSW-1","model":"SNSW-102P16EU","gen":2}"#,
        )
        .unwrap();
        assert_eq!(info.model_hint(), Some("SNSW-102P16EU"));

        let info: RawDeviceInfo =
            serde_json::from_str(r#"{"mac":"m","type":"SHSW-1"}"#).unwrap();
        assert_eq!(info.model_hint(), Some("SHSW-1"));
    }

    #[test]
    fn test_firmware_floor_gen1_only() {
        let old = RawDeviceInfo {
            fw: Some("20190508-123456/v1.5.0".to_string()),
            ..Default::default()
        };
        assert!(!firmware_supported(&old));

        let new = RawDeviceInfo {
            fw: Some("20230913-112003/v1.14.0".to_string()),
            ..Default::default()
        };
        assert!(firmware_supported(&new));

        let gen2 = RawDeviceInfo {
            gen: Some(2),
            fw: Some("20190508-123456".to_string()),
            ..Default::default()
        };
        assert!(firmware_supported(&gen2));
    }

    #[tokio::test]
    async fn test_scripted_probe_repeats_last_result() {
        let probe = ScriptedProbe::new();
        probe.push_info(Err(ProbeError::ConnectionFailed("down".into())));
        probe.push_info(Ok(RawDeviceInfo {
            mac: "AABBCCDDEEFF".into(),
            ..Default::default()
        }));

        assert!(probe.get_info("1.1.1.1").await.is_err());
        assert!(probe.get_info("1.1.1.1").await.is_ok());
        // Last consumed result repeats once the queue drains.
        assert!(probe.get_info("1.1.1.1").await.is_ok());

        // A newly pushed result takes over from the replay.
        probe.push_info(Err(ProbeError::InvalidCredentials));
        assert!(probe.get_info("1.1.1.1").await.is_err());
    }
}

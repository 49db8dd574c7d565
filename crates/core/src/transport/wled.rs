//! HTTP transport speaking the WLED JSON API.
//!
//! - `GET  /json/state` reads power, brightness and the primary color of the first segment
//! - `POST /json/state` applies a partial update; `"v": true` makes WLED answer with the new state
//! - `GET  /json/info` is used as the reachability probe

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cuelight_devices::{Color, Device, DeviceId, DeviceState, StateUpdate};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{DeviceTransport, TransportError};
use crate::config::Settings;

pub struct WledTransport {
    client: Client,
    addresses: RwLock<HashMap<DeviceId, String>>,
    state_timeout: Duration,
    probe_timeout: Duration,
}

impl WledTransport {
    pub fn new(state_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            client: build_client(probe_timeout),
            addresses: RwLock::new(HashMap::new()),
            state_timeout,
            probe_timeout,
        }
    }

    pub fn state_timeout(&self) -> Duration {
        self.state_timeout
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Duration::from_secs(settings.state_timeout_secs as u64),
            Duration::from_secs(settings.probe_timeout_secs as u64),
        )
    }

    pub fn register_device(&self, device: &Device) {
        self.addresses
            .write()
            .insert(device.id, device.ip_address.clone());
    }

    pub fn register_devices(&self, devices: &[Device]) {
        let mut addresses = self.addresses.write();
        for device in devices {
            addresses.insert(device.id, device.ip_address.clone());
        }
    }

    /// Make `devices` the only known addresses, e.g. after the show was reloaded.
    pub fn replace_devices(&self, devices: &[Device]) {
        let addresses = devices
            .iter()
            .map(|device| (device.id, device.ip_address.clone()))
            .collect();
        *self.addresses.write() = addresses;
    }

    pub fn remove_device(&self, device_id: DeviceId) {
        self.addresses.write().remove(&device_id);
    }

    fn url(&self, device_id: DeviceId, path: &str) -> Result<String, TransportError> {
        let addresses = self.addresses.read();
        let host = addresses
            .get(&device_id)
            .ok_or(TransportError::UnknownDevice(device_id))?;
        Ok(format!("http://{}{}", host, path))
    }

    fn request_error(device_id: DeviceId, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout { device_id }
        } else {
            TransportError::Unreachable {
                device_id,
                message: e.to_string(),
            }
        }
    }

    async fn read_state(
        device_id: DeviceId,
        response: reqwest::Response,
    ) -> Result<DeviceState, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                device_id,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Self::request_error(device_id, e))?;
        parse_state(&body).map_err(|e| TransportError::InvalidResponse {
            device_id,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl DeviceTransport for WledTransport {
    async fn get_state(&self, device_id: DeviceId) -> Result<DeviceState, TransportError> {
        let url = self.url(device_id, "/json/state")?;
        let response = self
            .client
            .get(&url)
            .timeout(self.state_timeout)
            .send()
            .await
            .map_err(|e| Self::request_error(device_id, e))?;

        Self::read_state(device_id, response).await
    }

    async fn set_state(
        &self,
        device_id: DeviceId,
        update: &StateUpdate,
    ) -> Result<DeviceState, TransportError> {
        let url = self.url(device_id, "/json/state")?;
        let response = self
            .client
            .post(&url)
            .timeout(self.state_timeout)
            .json(&WledUpdate::from(update))
            .send()
            .await
            .map_err(|e| Self::request_error(device_id, e))?;

        Self::read_state(device_id, response).await
    }

    async fn probe(&self, device_id: DeviceId) -> Result<bool, TransportError> {
        let url = self.url(device_id, "/json/info")?;
        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| Self::request_error(device_id, e))?;

        Ok(response.status().is_success())
    }
}

/// Every request still carries its own timeout, so only the connect bound is lost
/// if the tuned client can't be built.
fn build_client(connect_timeout: Duration) -> Client {
    match Client::builder().connect_timeout(connect_timeout).build() {
        Ok(client) => client,
        Err(e) => {
            log::warn!(
                "Could not build HTTP client with a {:?} connect timeout, using defaults: {}",
                connect_timeout,
                e
            );
            Client::new()
        }
    }
}

#[derive(Debug, Deserialize)]
struct WledState {
    #[serde(default)]
    on: bool,
    #[serde(default = "default_brightness")]
    bri: u8,
    #[serde(default)]
    seg: Vec<WledSegment>,
}

#[derive(Debug, Default, Deserialize)]
struct WledSegment {
    #[serde(default)]
    col: Vec<Vec<u8>>,
}

fn default_brightness() -> u8 {
    DeviceState::default().brightness
}

impl From<WledState> for DeviceState {
    fn from(state: WledState) -> Self {
        // Primary color of the first segment; RGB-only strips report three channels.
        let mut channels = [0u8; 4];
        if let Some(primary) = state.seg.first().and_then(|s| s.col.first()) {
            for (slot, value) in channels.iter_mut().zip(primary.iter()) {
                *slot = *value;
            }
        }

        DeviceState {
            on: state.on,
            brightness: state.bri,
            color: Color(channels),
        }
    }
}

#[derive(Debug, Serialize)]
struct WledUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transition: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seg: Option<Vec<WledSegmentUpdate>>,
    v: bool,
}

#[derive(Debug, Serialize)]
struct WledSegmentUpdate {
    col: Vec<[u8; 4]>,
}

impl From<&StateUpdate> for WledUpdate {
    fn from(update: &StateUpdate) -> Self {
        Self {
            on: update.on,
            bri: update.brightness,
            transition: update.transition_ticks,
            seg: update.color.map(|color| {
                vec![WledSegmentUpdate {
                    col: vec![color.channels()],
                }]
            }),
            v: true,
        }
    }
}

fn parse_state(body: &str) -> Result<DeviceState, serde_json::Error> {
    // With "v": true the state may come wrapped as {"state": {...}}.
    let value: serde_json::Value = serde_json::from_str(body)?;
    let state = match value.get("state") {
        Some(inner) => inner.clone(),
        None => value,
    };
    let state: WledState = serde_json::from_value(state)?;
    Ok(state.into())
}

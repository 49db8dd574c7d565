pub mod wled;

use async_trait::async_trait;
use cuelight_devices::{DeviceId, DeviceState, StateUpdate};
use thiserror::Error;

pub use wled::WledTransport;

/// Device I/O failures. The engine only logs these; none of them abort a cue.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device {0} has no known address")]
    UnknownDevice(DeviceId),

    #[error("request to device {device_id} timed out")]
    Timeout { device_id: DeviceId },

    #[error("device {device_id} unreachable: {message}")]
    Unreachable { device_id: DeviceId, message: String },

    #[error("device {device_id} answered with status {status}")]
    Status { device_id: DeviceId, status: u16 },

    #[error("invalid response from device {device_id}: {message}")]
    InvalidResponse { device_id: DeviceId, message: String },
}

/// Wire-level access to a device. Every call is a bounded network round trip.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn get_state(&self, device_id: DeviceId) -> Result<DeviceState, TransportError>;

    async fn set_state(
        &self,
        device_id: DeviceId,
        update: &StateUpdate,
    ) -> Result<DeviceState, TransportError>;

    /// Lightweight reachability check.
    async fn probe(&self, device_id: DeviceId) -> Result<bool, TransportError>;
}

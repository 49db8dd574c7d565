use chrono::{DateTime, Utc};
use cuelight_devices::DeviceId;
use serde::Serialize;

/// Consecutive failed probes before a device is reported as disconnected.
pub const MAX_ERROR_COUNT: u32 = 3;

/// Last known connectivity of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub device_id: DeviceId,
    pub is_connected: bool,
    pub last_ping_at: Option<DateTime<Utc>>,
    /// Consecutive failed probes.
    pub error_count: u32,
}

impl ConnectionStatus {
    /// Status of a device that has never been probed.
    pub fn unchecked(device_id: DeviceId) -> Self {
        Self {
            device_id,
            is_connected: false,
            last_ping_at: None,
            error_count: 0,
        }
    }

    /// Status taken directly from one probe, with no hysteresis applied.
    pub fn from_probe(device_id: DeviceId, reachable: bool, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            is_connected: reachable,
            last_ping_at: Some(now),
            error_count: if reachable { 0 } else { 1 },
        }
    }

    /// Fold one probe result into the status.
    ///
    /// A success resets the counter. A failure only flips the device to
    /// disconnected once `max_error_count` consecutive failures have been seen.
    pub fn record_probe(&mut self, reachable: bool, max_error_count: u32, now: DateTime<Utc>) {
        self.last_ping_at = Some(now);
        if reachable {
            self.error_count = 0;
            self.is_connected = true;
        } else {
            self.error_count = self.error_count.saturating_add(1);
            self.is_connected = self.error_count < max_error_count;
        }
    }
}

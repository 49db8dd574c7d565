use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cuelight_devices::DeviceId;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::connection_status::{ConnectionStatus, MAX_ERROR_COUNT};
use crate::show::ShowStore;
use crate::transport::DeviceTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Time between sweeps over every known device.
    pub interval: Duration,
    pub max_error_count: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_error_count: MAX_ERROR_COUNT,
        }
    }
}

/// Best-effort connectivity tracking for every device in the show.
///
/// Never fails: probe errors of any kind count as a failed probe and only
/// move the per-device error counter.
pub struct ConnectionMonitor {
    transport: Arc<dyn DeviceTransport>,
    store: Arc<dyn ShowStore>,
    settings: MonitorSettings,
    statuses: RwLock<HashMap<DeviceId, ConnectionStatus>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionMonitor {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        store: Arc<dyn ShowStore>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            transport,
            store,
            settings,
            statuses: RwLock::new(HashMap::new()),
            sweep_task: Mutex::new(None),
        }
    }

    /// Start periodic sweeps. The first sweep runs immediately. No-op if already running.
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut sweep_task = self.sweep_task.lock();
        if sweep_task.is_some() {
            return;
        }

        let monitor = Arc::downgrade(self);
        let period = self.settings.interval;
        *sweep_task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.sweep().await;
            }
        }));

        log::info!("Connection monitoring started, sweeping every {:?}", period);
    }

    /// Stop periodic sweeps. No-op if not running.
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.sweep_task.lock().take() {
            handle.abort();
            log::info!("Connection monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.sweep_task.lock().is_some()
    }

    /// Probe every known device once, concurrently.
    pub async fn sweep(&self) {
        let devices = match self.store.devices().await {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("Connection sweep skipped, could not list devices: {}", e);
                return;
            }
        };

        join_all(
            devices
                .iter()
                .map(|device| self.check_device_connection(device.id)),
        )
        .await;
    }

    /// Probe one device now and return its hysteresis-smoothed connectivity.
    pub async fn check_device_connection(&self, device_id: DeviceId) -> bool {
        let reachable = self.probe(device_id).await;
        self.record(device_id, reachable)
    }

    /// Stored status for a device, probing it first if it has never been checked.
    pub async fn get_connection_status(&self, device_id: DeviceId) -> ConnectionStatus {
        if let Some(status) = self.cached_status(device_id) {
            return status;
        }

        self.check_device_connection(device_id).await;
        self.cached_status(device_id)
            .unwrap_or_else(|| ConnectionStatus::unchecked(device_id))
    }

    /// One status per known device, in show order. Unchecked devices are probed first.
    pub async fn get_all_connection_statuses(&self) -> Vec<ConnectionStatus> {
        let devices = match self.store.devices().await {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("Could not list devices, returning cached statuses: {}", e);
                let mut statuses: Vec<ConnectionStatus> =
                    self.statuses.read().values().cloned().collect();
                statuses.sort_by_key(|s| s.device_id);
                return statuses;
            }
        };

        let unchecked: Vec<DeviceId> = {
            let statuses = self.statuses.read();
            devices
                .iter()
                .map(|d| d.id)
                .filter(|id| !statuses.contains_key(id))
                .collect()
        };
        join_all(unchecked.iter().map(|id| self.check_device_connection(*id))).await;

        let statuses = self.statuses.read();
        devices
            .iter()
            .map(|device| {
                statuses
                    .get(&device.id)
                    .cloned()
                    .unwrap_or_else(|| ConnectionStatus::unchecked(device.id))
            })
            .collect()
    }

    /// Forget everything known about a device and probe it again.
    ///
    /// The result of this probe is taken as-is, without hysteresis.
    pub async fn reconnect_device(&self, device_id: DeviceId) -> bool {
        self.statuses.write().remove(&device_id);

        let reachable = self.probe(device_id).await;
        self.statuses.write().insert(
            device_id,
            ConnectionStatus::from_probe(device_id, reachable, Utc::now()),
        );

        if reachable {
            log::info!("Device {} reconnected", device_id);
        } else {
            log::warn!("Device {} is still unreachable", device_id);
        }
        reachable
    }

    pub fn cached_status(&self, device_id: DeviceId) -> Option<ConnectionStatus> {
        self.statuses.read().get(&device_id).cloned()
    }

    async fn probe(&self, device_id: DeviceId) -> bool {
        match self.transport.probe(device_id).await {
            Ok(reachable) => reachable,
            Err(e) => {
                log::debug!("Probe of device {} failed: {}", device_id, e);
                false
            }
        }
    }

    fn record(&self, device_id: DeviceId, reachable: bool) -> bool {
        let mut statuses = self.statuses.write();
        let status = statuses
            .entry(device_id)
            .or_insert_with(|| ConnectionStatus::unchecked(device_id));

        let was_checked = status.last_ping_at.is_some();
        let was_connected = status.is_connected;
        status.record_probe(reachable, self.settings.max_error_count, Utc::now());

        if was_connected && !status.is_connected {
            log::warn!(
                "Device {} disconnected after {} failed probes",
                device_id,
                status.error_count
            );
        } else if was_checked && !was_connected && status.is_connected {
            log::info!("Device {} connected", device_id);
        }

        status.is_connected
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep_task.get_mut().take() {
            handle.abort();
        }
    }
}

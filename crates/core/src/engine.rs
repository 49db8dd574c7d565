use std::sync::Arc;

use cuelight_devices::{DeviceId, DeviceState, StateUpdate};
use futures::future::join_all;
use serde::Serialize;

use crate::config::Settings;
use crate::connection::{ConnectionMonitor, ConnectionStatus};
use crate::cue::{CueExecutor, CueId, CueList, CueListPlayer, ExecutionStatus};
use crate::error::EngineError;
use crate::show::{PresetId, ShowStore};
use crate::transport::DeviceTransport;

/// Outcome of writing a preset to one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetResult {
    pub device_id: DeviceId,
    pub success: bool,
    /// State reported back by the device on success.
    pub state: Option<DeviceState>,
    pub error: Option<String>,
}

/// Everything the API layer talks to. Build one per process.
pub struct LightingEngine {
    store: Arc<dyn ShowStore>,
    transport: Arc<dyn DeviceTransport>,
    executor: Arc<CueExecutor>,
    monitor: Arc<ConnectionMonitor>,
}

impl LightingEngine {
    pub fn new(
        store: Arc<dyn ShowStore>,
        transport: Arc<dyn DeviceTransport>,
        settings: &Settings,
    ) -> Self {
        let executor = Arc::new(CueExecutor::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            settings.executor_settings(),
        ));
        let monitor = Arc::new(ConnectionMonitor::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            settings.monitor_settings(),
        ));

        Self {
            store,
            transport,
            executor,
            monitor,
        }
    }

    /// Start background connection monitoring.
    pub fn initialize(&self) {
        log::info!("Initializing lighting engine...");
        self.monitor.start_monitoring();
        log::info!("Lighting engine initialized");
    }

    /// Stop any running cue and all background monitoring.
    pub fn shutdown(&self) {
        log::info!("Shutting down lighting engine...");
        self.executor.stop_execution();
        self.monitor.stop_monitoring();
        log::info!("Lighting engine shutdown complete");
    }

    pub fn executor(&self) -> &Arc<CueExecutor> {
        &self.executor
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    // Execution

    pub async fn execute_cue(&self, cue_id: CueId) -> Result<(), EngineError> {
        self.executor.execute_cue(cue_id).await
    }

    pub fn stop_execution(&self) {
        self.executor.stop_execution();
    }

    pub fn get_execution_status(&self) -> ExecutionStatus {
        self.executor.get_execution_status()
    }

    pub fn is_executing(&self) -> bool {
        self.executor.is_executing()
    }

    pub fn cue_list_player(&self, cue_list: CueList) -> CueListPlayer {
        CueListPlayer::new(Arc::clone(&self.executor), cue_list)
    }

    // Connectivity

    pub async fn get_all_connection_statuses(&self) -> Vec<ConnectionStatus> {
        self.monitor.get_all_connection_statuses().await
    }

    pub async fn get_connection_status(
        &self,
        device_id: DeviceId,
    ) -> Result<ConnectionStatus, EngineError> {
        self.ensure_device(device_id).await?;
        Ok(self.monitor.get_connection_status(device_id).await)
    }

    pub async fn check_device_connection(&self, device_id: DeviceId) -> Result<bool, EngineError> {
        self.ensure_device(device_id).await?;
        Ok(self.monitor.check_device_connection(device_id).await)
    }

    pub async fn reconnect_device(&self, device_id: DeviceId) -> Result<bool, EngineError> {
        self.ensure_device(device_id).await?;
        Ok(self.monitor.reconnect_device(device_id).await)
    }

    // Presets

    /// Write a preset to every listed device at once.
    ///
    /// Unknown presets or devices fail the whole call before anything is sent.
    /// After that, each device succeeds or fails on its own. Running transitions
    /// are left alone and may overwrite the preset on their next frame.
    pub async fn apply_preset_to_devices(
        &self,
        preset_id: PresetId,
        device_ids: &[DeviceId],
    ) -> Result<Vec<PresetResult>, EngineError> {
        let preset = self
            .store
            .preset(preset_id)
            .await?
            .ok_or(EngineError::PresetNotFound(preset_id))?;
        for &device_id in device_ids {
            self.ensure_device(device_id).await?;
        }

        log::info!(
            "Applying preset {} '{}' to {} device(s)",
            preset.id,
            preset.name,
            device_ids.len()
        );

        let update = StateUpdate::preset(preset.color, preset.brightness);
        let writes = device_ids.iter().map(|&device_id| {
            let transport = Arc::clone(&self.transport);
            async move {
                match transport.set_state(device_id, &update).await {
                    Ok(state) => PresetResult {
                        device_id,
                        success: true,
                        state: Some(state),
                        error: None,
                    },
                    Err(e) => {
                        log::warn!("Preset write to device {} failed: {}", device_id, e);
                        PresetResult {
                            device_id,
                            success: false,
                            state: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });

        Ok(join_all(writes).await)
    }

    async fn ensure_device(&self, device_id: DeviceId) -> Result<(), EngineError> {
        match self.store.device(device_id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::DeviceNotFound(device_id)),
        }
    }
}

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cuelight_core::{
    Cue, CueStep, DeviceTransport, LightingEngine, Settings, Show, ShowLibrary, TransportError,
};
use cuelight_devices::{Color, Device, DeviceId, DeviceState, StateUpdate};
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedWrite {
    pub device_id: DeviceId,
    /// Virtual time since the transport was created.
    pub at: Duration,
    pub update: StateUpdate,
}

/// In-memory devices that record every write with its virtual timestamp.
pub struct RecordingTransport {
    started: Instant,
    states: Mutex<HashMap<DeviceId, DeviceState>>,
    writes: Mutex<Vec<RecordedWrite>>,
    failing_gets: Mutex<HashSet<DeviceId>>,
    failing_sets: Mutex<HashSet<DeviceId>>,
    probe_script: Mutex<HashMap<DeviceId, VecDeque<bool>>>,
    probes: Mutex<Vec<DeviceId>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            states: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            failing_gets: Mutex::new(HashSet::new()),
            failing_sets: Mutex::new(HashSet::new()),
            probe_script: Mutex::new(HashMap::new()),
            probes: Mutex::new(Vec::new()),
        })
    }

    pub fn set_device_state(&self, device_id: DeviceId, brightness: u8, color: Color) {
        self.states.lock().insert(
            device_id,
            DeviceState {
                on: brightness > 0,
                brightness,
                color,
            },
        );
    }

    pub fn device_state(&self, device_id: DeviceId) -> Option<DeviceState> {
        self.states.lock().get(&device_id).copied()
    }

    pub fn fail_gets(&self, device_id: DeviceId) {
        self.failing_gets.lock().insert(device_id);
    }

    pub fn fail_sets(&self, device_id: DeviceId) {
        self.failing_sets.lock().insert(device_id);
    }

    /// Queue probe results for a device. Unscripted probes succeed.
    pub fn script_probes(&self, device_id: DeviceId, results: &[bool]) {
        self.probe_script
            .lock()
            .entry(device_id)
            .or_default()
            .extend(results.iter().copied());
    }

    pub fn probe_count(&self, device_id: DeviceId) -> usize {
        self.probes.lock().iter().filter(|id| **id == device_id).count()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().clone()
    }

    pub fn writes_for(&self, device_id: DeviceId) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .iter()
            .filter(|w| w.device_id == device_id)
            .copied()
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    fn unreachable(device_id: DeviceId) -> TransportError {
        TransportError::Unreachable {
            device_id,
            message: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl DeviceTransport for RecordingTransport {
    async fn get_state(&self, device_id: DeviceId) -> Result<DeviceState, TransportError> {
        if self.failing_gets.lock().contains(&device_id) {
            return Err(Self::unreachable(device_id));
        }
        Ok(self
            .states
            .lock()
            .get(&device_id)
            .copied()
            .unwrap_or_default())
    }

    async fn set_state(
        &self,
        device_id: DeviceId,
        update: &StateUpdate,
    ) -> Result<DeviceState, TransportError> {
        self.writes.lock().push(RecordedWrite {
            device_id,
            at: self.started.elapsed(),
            update: *update,
        });

        if self.failing_sets.lock().contains(&device_id) {
            return Err(Self::unreachable(device_id));
        }

        let mut states = self.states.lock();
        let state = states.entry(device_id).or_default();
        *state = update.apply_to(state);
        Ok(*state)
    }

    async fn probe(&self, device_id: DeviceId) -> Result<bool, TransportError> {
        self.probes.lock().push(device_id);
        let scripted = self
            .probe_script
            .lock()
            .get_mut(&device_id)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(true) | None => Ok(true),
            Some(false) => Err(Self::unreachable(device_id)),
        }
    }
}

pub fn brightness_step(order: u32, offset: f64, duration: f64, target: u8) -> CueStep {
    CueStep {
        order,
        time_offset: offset,
        transition_duration: duration,
        target_brightness: Some(target),
        device_ids: vec![1],
        ..Default::default()
    }
}

pub fn cue(id: u32, steps: Vec<CueStep>) -> Cue {
    Cue {
        id,
        name: format!("Cue {}", id),
        steps,
    }
}

/// Three devices and the given cues.
pub fn show_with(cues: Vec<Cue>) -> Show {
    let mut show = Show::new("Test show");
    show.devices = vec![
        Device::new(1, "Stage left", "10.0.0.11"),
        Device::new(2, "Stage right", "10.0.0.12"),
        Device::new(3, "Cyc", "10.0.0.13"),
    ];
    show.cues = cues;
    show
}

pub fn engine_with(
    show: Show,
    transport: &Arc<RecordingTransport>,
    settings: &Settings,
) -> LightingEngine {
    let store = Arc::new(ShowLibrary::from_show(show).unwrap());
    LightingEngine::new(store, Arc::clone(transport) as Arc<dyn DeviceTransport>, settings)
}

pub fn engine(show: Show, transport: &Arc<RecordingTransport>) -> LightingEngine {
    engine_with(show, transport, &Settings::default())
}

pub fn brightness_of(write: &RecordedWrite) -> u8 {
    write.update.brightness.unwrap()
}

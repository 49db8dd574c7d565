pub use config::{ConfigError, ConfigManager, ConfigSchema, Settings};
pub use connection::{ConnectionMonitor, ConnectionStatus, MonitorSettings, MAX_ERROR_COUNT};
pub use cue::{
    Cue, CueExecutor, CueId, CueList, CueListPlayer, CueStep, ExecutionStatus, ExecutorSettings,
    Transition, TransitionRunner,
};
pub use engine::{LightingEngine, PresetResult};
pub use error::{EngineError, ErrorKind};
pub use show::{Preset, PresetId, Show, ShowLibrary, ShowStore};
pub use transport::{DeviceTransport, TransportError, WledTransport};

pub mod config;
pub mod connection;
pub mod cue;
mod engine;
mod error;
pub mod show;
pub mod transport;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::MonitorSettings;
use crate::cue::executor::ExecutorSettings;

/// Engine settings, persisted as JSON by [`ConfigManager`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    // Playback
    pub frame_rate: u32,
    pub await_transitions_on_completion: bool,

    // Connectivity
    pub monitor_interval_secs: u32,
    pub max_error_count: u32,

    // Transport
    pub state_timeout_secs: u32,
    pub probe_timeout_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            await_transitions_on_completion: true,

            monitor_interval_secs: 10,
            max_error_count: 3,

            state_timeout_secs: 10,
            probe_timeout_secs: 5,
        }
    }
}

impl Settings {
    /// Time between interpolation frames, truncated to whole milliseconds.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis((1000 / self.frame_rate.max(1)) as u64)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            frame_interval: self.frame_interval(),
            await_transitions_on_completion: self.await_transitions_on_completion,
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(self.monitor_interval_secs.max(1) as u64),
            max_error_count: self.max_error_count.max(1),
        }
    }
}

/// Configuration manager for engine settings.
/// Keeps the persisted values separate from the schema describing what is valid.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub playback: PlaybackConfigSchema,
    pub connectivity: ConnectivityConfigSchema,
    pub transport: TransportConfigSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfigSchema {
    pub frame_rate: ConfigOption<u32>,
    pub await_transitions_on_completion: ConfigOption<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfigSchema {
    pub monitor_interval_secs: ConfigOption<u32>,
    pub max_error_count: ConfigOption<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfigSchema {
    pub state_timeout_secs: ConfigOption<u32>,
    pub probe_timeout_secs: ConfigOption<u32>,
}

/// Configuration option with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub description: String,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigManager {
    /// Create a new configuration manager.
    /// Without an explicit path the file lives at `<config dir>/cuelight/config.json`.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(Self::default_path);

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("cuelight"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.json")
    }

    /// Load settings from the configuration file, writing defaults if it doesn't exist yet
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content =
            fs::read_to_string(&self.config_path).map_err(|e| ConfigError::Read(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match engine version {}, missing settings use defaults",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        Self::validate_settings(&config_file.settings).map_err(ConfigError::Validation)?;

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to the configuration file
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::Write(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: now.clone(),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(&self.config_path, content).map_err(|e| ConfigError::Write(e.to_string()))?;

        Ok(())
    }

    /// Validate, update and save settings
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::Validation)?;
        self.settings = settings;
        self.save()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn schema() -> ConfigSchema {
        let defaults = Settings::default();
        ConfigSchema {
            playback: PlaybackConfigSchema {
                frame_rate: ConfigOption {
                    default: defaults.frame_rate,
                    valid_range: Some((1, 120)),
                    description: "Interpolation frames per second sent to each device".to_string(),
                },
                await_transitions_on_completion: ConfigOption {
                    default: defaults.await_transitions_on_completion,
                    valid_range: None,
                    description:
                        "Report a cue as finished only after its transitions have stopped writing"
                            .to_string(),
                },
            },
            connectivity: ConnectivityConfigSchema {
                monitor_interval_secs: ConfigOption {
                    default: defaults.monitor_interval_secs,
                    valid_range: Some((1, 3600)),
                    description: "Seconds between connectivity sweeps".to_string(),
                },
                max_error_count: ConfigOption {
                    default: defaults.max_error_count,
                    valid_range: Some((1, 20)),
                    description: "Consecutive failed probes before a device is disconnected"
                        .to_string(),
                },
            },
            transport: TransportConfigSchema {
                state_timeout_secs: ConfigOption {
                    default: defaults.state_timeout_secs,
                    valid_range: Some((1, 60)),
                    description: "Timeout for device state reads and writes".to_string(),
                },
                probe_timeout_secs: ConfigOption {
                    default: defaults.probe_timeout_secs,
                    valid_range: Some((1, 60)),
                    description: "Timeout for reachability probes".to_string(),
                },
            },
        }
    }

    /// Validate settings against schema
    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let schema = Self::schema();
        let mut errors = Vec::new();

        let ranged = [
            ("frame_rate", settings.frame_rate, &schema.playback.frame_rate),
            (
                "monitor_interval_secs",
                settings.monitor_interval_secs,
                &schema.connectivity.monitor_interval_secs,
            ),
            (
                "max_error_count",
                settings.max_error_count,
                &schema.connectivity.max_error_count,
            ),
            (
                "state_timeout_secs",
                settings.state_timeout_secs,
                &schema.transport.state_timeout_secs,
            ),
            (
                "probe_timeout_secs",
                settings.probe_timeout_secs,
                &schema.transport.probe_timeout_secs,
            ),
        ];

        for (name, value, option) in ranged {
            if let Some((min, max)) = option.valid_range {
                if value < min || value > max {
                    errors.push(format!("{} must be between {} and {}", name, min, max));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reset settings to defaults
    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        self.save()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),
    #[error("Failed to write config file: {0}")]
    Write(String),
    #[error("Failed to parse config file: {0}")]
    Parse(String),
    #[error("Failed to serialize config: {0}")]
    Serialize(String),
    #[error("Config validation errors: {}", .0.join(", "))]
    Validation(Vec<String>),
}

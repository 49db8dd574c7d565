use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use cuelight_devices::{Device, DeviceId};
use parking_lot::RwLock;
use serde_json::from_reader;

use super::show::{Preset, PresetId, Show};
use crate::cue::cue::{Cue, CueId};

/// Read access to persisted cues, presets and devices.
///
/// The engine never writes through this; storage lives behind it.
#[async_trait]
pub trait ShowStore: Send + Sync {
    async fn cue(&self, id: CueId) -> Result<Option<Cue>>;

    async fn preset(&self, id: PresetId) -> Result<Option<Preset>>;

    async fn devices(&self) -> Result<Vec<Device>>;

    async fn device(&self, id: DeviceId) -> Result<Option<Device>> {
        Ok(self.devices().await?.into_iter().find(|d| d.id == id))
    }
}

/// In-memory show, optionally backed by a JSON show file.
pub struct ShowLibrary {
    show: RwLock<Show>,
    path: Option<PathBuf>,
}

impl ShowLibrary {
    pub fn from_show(show: Show) -> Result<Self> {
        show.validate().map_err(|e| anyhow!("invalid show: {}", e))?;
        Ok(Self {
            show: RwLock::new(show),
            path: None,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let show = Self::read_show(path)?;
        log::info!(
            "Loaded show '{}' from {}: {} devices, {} cues",
            show.name,
            path.display(),
            show.devices.len(),
            show.cues.len()
        );
        Ok(Self {
            show: RwLock::new(show),
            path: Some(path.to_path_buf()),
        })
    }

    /// Re-read the backing file. The current show is kept if the file is invalid.
    ///
    /// Device addresses held by a transport are not touched; pass the new
    /// device list to `WledTransport::replace_devices` afterwards.
    pub fn reload(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow!("show was not loaded from a file"))?;
        let show = Self::read_show(path)?;
        *self.show.write() = show;
        Ok(())
    }

    pub fn show(&self) -> Show {
        self.show.read().clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read_show(path: &Path) -> Result<Show> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let show: Show = from_reader(file)
            .with_context(|| format!("failed to parse show file {}", path.display()))?;
        show.validate()
            .map_err(|e| anyhow!("invalid show file {}: {}", path.display(), e))?;
        Ok(show)
    }
}

#[async_trait]
impl ShowStore for ShowLibrary {
    async fn cue(&self, id: CueId) -> Result<Option<Cue>> {
        Ok(self.show.read().find_cue(id).cloned())
    }

    async fn preset(&self, id: PresetId) -> Result<Option<Preset>> {
        Ok(self.show.read().find_preset(id).cloned())
    }

    async fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.show.read().devices.clone())
    }

    async fn device(&self, id: DeviceId) -> Result<Option<Device>> {
        Ok(self.show.read().find_device(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use cuelight_devices::Color;
    use tempfile::NamedTempFile;

    use super::*;

    const SHOW_JSON: &str = r#"{
        "name": "Winter Gala",
        "devices": [
            {"id": 1, "name": "Stage left", "ip_address": "10.0.0.21"},
            {"id": 2, "name": "Stage right", "ip_address": "10.0.0.22"}
        ],
        "cues": [
            {"id": 10, "name": "Warm wash", "steps": [
                {"order": 1, "time_offset": 0, "transition_duration": 2.5,
                 "target_color": [255, 140, 40, 0], "target_brightness": 200, "device_ids": [1, 2]}
            ]}
        ],
        "presets": [{"id": 3, "name": "Blue", "color": [0, 0, 255, 0], "brightness": 150}]
    }"#;

    fn write_show(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_and_query() {
        let file = write_show(SHOW_JSON);
        let library = ShowLibrary::load(file.path()).unwrap();

        let cue = library.cue(10).await.unwrap().unwrap();
        assert_eq!(cue.steps[0].target_color, Some(Color::rgbw(255, 140, 40, 0)));
        assert!(library.cue(11).await.unwrap().is_none());

        assert_eq!(library.devices().await.unwrap().len(), 2);
        assert_eq!(library.device(2).await.unwrap().unwrap().name, "Stage right");
        assert_eq!(library.preset(3).await.unwrap().unwrap().brightness, 150);
    }

    #[test]
    fn test_load_rejects_invalid_step() {
        let broken = SHOW_JSON.replace("\"device_ids\": [1, 2]", "\"device_ids\": []");
        let file = write_show(&broken);
        assert!(ShowLibrary::load(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_devices() {
        let file = write_show(SHOW_JSON);
        let library = ShowLibrary::load(file.path()).unwrap();

        let moved = SHOW_JSON.replace("10.0.0.22", "10.0.0.99");
        std::fs::write(file.path(), moved).unwrap();
        library.reload().unwrap();

        let device = library.device(2).await.unwrap().unwrap();
        assert_eq!(device.ip_address, "10.0.0.99");
    }

    #[test]
    fn test_reload_keeps_show_on_error() {
        let file = write_show(SHOW_JSON);
        let library = ShowLibrary::load(file.path()).unwrap();

        std::fs::write(file.path(), "{ not json").unwrap();

        assert!(library.reload().is_err());
        assert_eq!(library.show().name, "Winter Gala");
    }

    #[test]
    fn test_reload_requires_file() {
        let library = ShowLibrary::from_show(Show::new("Scratch")).unwrap();
        assert!(library.path().is_none());
        assert!(library.reload().is_err());
    }
}

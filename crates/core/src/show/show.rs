use std::collections::HashSet;

use cuelight_devices::{Color, Device, DeviceId};
use serde::{Deserialize, Serialize};

use crate::cue::cue::{Cue, CueList};

pub type PresetId = u32;

/// A stored color/brightness look that can be applied to devices in one shot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: PresetId,
    pub name: String,
    pub color: Color,
    pub brightness: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub cues: Vec<Cue>,
    #[serde(default)]
    pub presets: Vec<Preset>,
    #[serde(default)]
    pub cue_lists: Vec<CueList>,
    #[serde(default = "current_version")]
    pub version: String, // Schema version for future compatibility
}

fn current_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Show {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            devices: Vec::new(),
            cues: Vec::new(),
            presets: Vec::new(),
            cue_lists: Vec::new(),
            version: current_version(),
        }
    }

    pub fn find_cue(&self, id: u32) -> Option<&Cue> {
        self.cues.iter().find(|c| c.id == id)
    }

    pub fn find_device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn find_preset(&self, id: PresetId) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// Check step invariants and that every referenced device and cue exists.
    pub fn validate(&self) -> Result<(), String> {
        let device_ids: HashSet<DeviceId> = self.devices.iter().map(|d| d.id).collect();
        if device_ids.len() != self.devices.len() {
            return Err("duplicate device ids".to_string());
        }

        for cue in &self.cues {
            cue.validate()?;
            for step in &cue.steps {
                if let Some(missing) = step.device_ids.iter().find(|id| !device_ids.contains(id)) {
                    return Err(format!(
                        "cue {} step {} references unknown device {}",
                        cue.id, step.order, missing
                    ));
                }
            }
        }

        for list in &self.cue_lists {
            if let Some(missing) = list.cue_ids.iter().find(|id| self.find_cue(**id).is_none()) {
                return Err(format!(
                    "cue list '{}' references unknown cue {}",
                    list.name, missing
                ));
            }
        }

        Ok(())
    }
}

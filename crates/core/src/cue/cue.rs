use std::time::Duration;

use cuelight_devices::{Color, DeviceId};
use serde::{Deserialize, Serialize};

pub type CueId = u32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub id: CueId,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<CueStep>,
}

impl Cue {
    /// Nominal end of the cue: the latest `time_offset + transition_duration` of any step.
    pub fn total_duration(&self) -> Duration {
        self.steps
            .iter()
            .map(CueStep::end_time)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), String> {
        for step in &self.steps {
            step.validate()
                .map_err(|e| format!("cue {} step {}: {}", self.id, step.order, e))?;
        }
        Ok(())
    }
}

/// One timed instruction within a cue.
///
/// Offsets and durations are in seconds. A missing `target_color` means a
/// brightness-only change, a missing `target_brightness` a color-only change.
/// Missing start values are read from the device when the step fires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CueStep {
    pub order: u32,
    #[serde(default)]
    pub time_offset: f64,
    #[serde(default)]
    pub transition_duration: f64,
    #[serde(default)]
    pub target_color: Option<Color>,
    #[serde(default)]
    pub target_brightness: Option<u8>,
    #[serde(default)]
    pub start_color: Option<Color>,
    #[serde(default)]
    pub start_brightness: Option<u8>,
    #[serde(default)]
    pub turn_off: bool,
    pub device_ids: Vec<DeviceId>,
}

impl Default for CueStep {
    fn default() -> Self {
        Self {
            order: 0,
            time_offset: 0.0,
            transition_duration: 0.0,
            target_color: None,
            target_brightness: None,
            start_color: None,
            start_brightness: None,
            turn_off: false,
            device_ids: Vec::new(),
        }
    }
}

impl CueStep {
    pub fn offset(&self) -> Duration {
        secs_to_duration(self.time_offset)
    }

    pub fn duration(&self) -> Duration {
        secs_to_duration(self.transition_duration)
    }

    pub fn end_time(&self) -> Duration {
        self.offset().saturating_add(self.duration())
    }

    /// Both start values are given, so the device never needs to be queried.
    pub fn has_explicit_start(&self) -> bool {
        self.start_color.is_some() && self.start_brightness.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.device_ids.is_empty() {
            return Err("step has no devices".to_string());
        }
        if !self.turn_off && self.target_color.is_none() && self.target_brightness.is_none() {
            return Err("step needs a target color or brightness unless it turns off".to_string());
        }
        if !self.time_offset.is_finite() || self.time_offset < 0.0 {
            return Err(format!("invalid time offset {}", self.time_offset));
        }
        if !self.transition_duration.is_finite() || self.transition_duration < 0.0 {
            return Err(format!(
                "invalid transition duration {}",
                self.transition_duration
            ));
        }
        if Duration::try_from_secs_f64(self.time_offset + self.transition_duration).is_err() {
            return Err(format!(
                "step ends too far in the future ({}s + {}s)",
                self.time_offset, self.transition_duration
            ));
        }
        Ok(())
    }
}

/// Ordered cues played back one after another by a [`CueListPlayer`](super::cue_list_player::CueListPlayer).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CueList {
    pub name: String,
    pub cue_ids: Vec<CueId>,
}

/// Saturates at `Duration::MAX`. Negative and non-finite values become zero.
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(offset: f64, duration: f64) -> CueStep {
        CueStep {
            time_offset: offset,
            transition_duration: duration,
            target_brightness: Some(200),
            device_ids: vec![1],
            ..Default::default()
        }
    }

    #[test]
    fn test_total_duration_is_latest_end() {
        let cue = Cue {
            id: 1,
            name: "Sunrise".to_string(),
            steps: vec![step(0.0, 3.0), step(1.0, 0.5), step(2.0, 2.0)],
        };
        assert_eq!(cue.total_duration(), Duration::from_secs(4));
    }

    #[test]
    fn test_empty_cue_has_zero_duration() {
        let cue = Cue {
            id: 1,
            name: "Empty".to_string(),
            steps: vec![],
        };
        assert_eq!(cue.total_duration(), Duration::ZERO);
    }

    #[test]
    fn test_step_validation() {
        assert!(step(0.0, 1.0).validate().is_ok());

        let mut no_devices = step(0.0, 1.0);
        no_devices.device_ids.clear();
        assert!(no_devices.validate().is_err());

        let mut no_target = step(0.0, 1.0);
        no_target.target_brightness = None;
        assert!(no_target.validate().is_err());
        no_target.turn_off = true;
        assert!(no_target.validate().is_ok());

        assert!(step(-1.0, 1.0).validate().is_err());
        assert!(step(0.0, f64::INFINITY).validate().is_err());

        assert!(step(1.0e20, 1.0).validate().is_err());
        assert!(step(1.0e19, 1.0e19).validate().is_err());

        // Fading to zero brightness is a valid blackout.
        let mut dark = step(0.0, 1.0);
        dark.target_brightness = Some(0);
        assert!(dark.validate().is_ok());
    }

    #[test]
    fn test_huge_values_saturate() {
        let huge = step(1.0e20, 1.0e20);
        assert_eq!(huge.offset(), Duration::MAX);
        assert_eq!(huge.end_time(), Duration::MAX);
    }

    #[test]
    fn test_step_deserializes_with_defaults() {
        let json = r#"{"order": 2, "time_offset": 1.5, "target_color": [255, 0, 0, 0], "device_ids": [3, 4]}"#;
        let step: CueStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.offset(), Duration::from_millis(1500));
        assert_eq!(step.duration(), Duration::ZERO);
        assert_eq!(step.target_color, Some(Color::rgbw(255, 0, 0, 0)));
        assert!(!step.turn_off);
        assert!(!step.has_explicit_start());
    }
}

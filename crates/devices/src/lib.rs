use serde::{Deserialize, Serialize};

pub type DeviceId = u32;

/// Native WLED transition unit.
pub const TRANSITION_TICK_MS: u64 = 100;

/// A network-addressable WLED controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub ip_address: String,
}

impl Device {
    pub fn new(id: DeviceId, name: &str, ip_address: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ip_address: ip_address.to_string(),
        }
    }
}

/// RGBW color, one byte per channel. Serialized as `[r, g, b, w]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const fn rgbw(r: u8, g: u8, b: u8, w: u8) -> Self {
        Color([r, g, b, w])
    }

    pub const fn black() -> Self {
        Color([0, 0, 0, 0])
    }

    pub fn red(&self) -> u8 {
        self.0[0]
    }

    pub fn green(&self) -> u8 {
        self.0[1]
    }

    pub fn blue(&self) -> u8 {
        self.0[2]
    }

    pub fn white(&self) -> u8 {
        self.0[3]
    }

    pub fn channels(&self) -> [u8; 4] {
        self.0
    }

    /// Linear blend of every channel independently, rounded to the nearest value.
    pub fn lerp(&self, target: &Color, progress: f64) -> Color {
        let mut out = [0u8; 4];
        for (i, channel) in out.iter_mut().enumerate() {
            *channel = lerp_u8(self.0[i], target.0[i], progress);
        }
        Color(out)
    }
}

/// Linear interpolation in raw 0-255 space. `progress` is clamped to 0..=1.
pub fn lerp_u8(start: u8, target: u8, progress: f64) -> u8 {
    let progress = progress.clamp(0.0, 1.0);
    let start = start as f64;
    let value = start + (target as f64 - start) * progress;
    value.round().clamp(0.0, 255.0) as u8
}

/// Live state reported by a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub on: bool,
    pub brightness: u8,
    pub color: Color,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: 128,
            color: Color::black(),
        }
    }
}

/// Partial state update. Fields left as `None` keep the device's own value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub on: Option<bool>,
    pub brightness: Option<u8>,
    pub color: Option<Color>,
    pub transition_ticks: Option<u16>,
}

impl StateUpdate {
    /// A single interpolation frame, applied immediately on the device.
    pub fn frame(color: Color, brightness: u8) -> Self {
        Self {
            on: Some(brightness > 0),
            brightness: Some(brightness),
            color: Some(color),
            transition_ticks: Some(0),
        }
    }

    pub fn power_off(transition_ticks: u16) -> Self {
        Self {
            on: Some(false),
            brightness: None,
            color: None,
            transition_ticks: Some(transition_ticks),
        }
    }

    /// One-shot color and brightness, using the device's own transition.
    pub fn preset(color: Color, brightness: u8) -> Self {
        Self {
            on: Some(true),
            brightness: Some(brightness),
            color: Some(color),
            transition_ticks: None,
        }
    }

    pub fn is_power_off(&self) -> bool {
        self.on == Some(false) && self.brightness.is_none() && self.color.is_none()
    }

    /// Merge this update into a known state.
    pub fn apply_to(&self, state: &DeviceState) -> DeviceState {
        DeviceState {
            on: self.on.unwrap_or(state.on),
            brightness: self.brightness.unwrap_or(state.brightness),
            color: self.color.unwrap_or(state.color),
        }
    }
}

/// Convert seconds into device transition ticks, saturating at `u16::MAX`.
pub fn transition_ticks_from_secs(secs: f64) -> u16 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    let ticks = (secs * 1000.0 / TRANSITION_TICK_MS as f64).round();
    if ticks >= u16::MAX as f64 {
        u16::MAX
    } else {
        ticks as u16
    }
}

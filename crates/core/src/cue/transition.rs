use std::sync::Arc;
use std::time::Duration;

use cuelight_devices::{
    lerp_u8, transition_ticks_from_secs, Color, DeviceId, DeviceState, StateUpdate,
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::cue::CueStep;
use crate::transport::DeviceTransport;

/// Start point used when a device's live state can't be read.
pub const DEFAULT_START_COLOR: Color = Color::black();
pub const DEFAULT_START_BRIGHTNESS: u8 = 128;

/// A linear ramp of one device's color and brightness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub start_color: Color,
    pub start_brightness: u8,
    pub target_color: Color,
    pub target_brightness: u8,
    pub duration: Duration,
}

impl Transition {
    /// Resolve start and target values for `step`, given the device's live state if it was read.
    pub fn for_step(step: &CueStep, live: Option<&DeviceState>) -> Self {
        let (start_color, start_brightness) = resolve_start_values(step, live);
        let (target_color, target_brightness) =
            resolve_target_values(step, start_color, start_brightness);

        Self {
            start_color,
            start_brightness,
            target_color,
            target_brightness,
            duration: step.duration(),
        }
    }

    /// Number of frames needed to cover the duration. Never less than one.
    pub fn frame_count(&self, frame_interval: Duration) -> u32 {
        let interval_ms = frame_interval.as_millis().max(1);
        let duration_ms = self.duration.as_millis();
        let frames = duration_ms.div_ceil(interval_ms).max(1);
        frames.min(u32::MAX as u128) as u32
    }

    /// Color and brightness at `progress` (0..=1).
    pub fn sample(&self, progress: f64) -> (Color, u8) {
        (
            self.start_color.lerp(&self.target_color, progress),
            lerp_u8(self.start_brightness, self.target_brightness, progress),
        )
    }
}

/// Explicit start values win, then the live device state, then the defaults.
pub fn resolve_start_values(step: &CueStep, live: Option<&DeviceState>) -> (Color, u8) {
    let color = step
        .start_color
        .or(live.map(|state| state.color))
        .unwrap_or(DEFAULT_START_COLOR);
    let brightness = step
        .start_brightness
        .or(live.map(|state| state.brightness))
        .unwrap_or(DEFAULT_START_BRIGHTNESS);
    (color, brightness)
}

/// Absent targets keep the corresponding start value.
pub fn resolve_target_values(step: &CueStep, start_color: Color, start_brightness: u8) -> (Color, u8) {
    (
        step.target_color.unwrap_or(start_color),
        step.target_brightness.unwrap_or(start_brightness),
    )
}

/// Drives a single device through one step.
#[derive(Clone)]
pub struct TransitionRunner {
    transport: Arc<dyn DeviceTransport>,
    frame_interval: Duration,
}

impl TransitionRunner {
    pub fn new(transport: Arc<dyn DeviceTransport>, frame_interval: Duration) -> Self {
        Self {
            transport,
            frame_interval,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Run the step on `device_id` to completion. Transport errors are logged, never returned.
    pub async fn run(&self, device_id: DeviceId, step: &CueStep) {
        if step.turn_off {
            self.power_off(device_id, step).await;
            return;
        }

        let live = if step.has_explicit_start() {
            None
        } else {
            match self.transport.get_state(device_id).await {
                Ok(state) => Some(state),
                Err(e) => {
                    log::warn!(
                        "Could not read state of device {}, using default start values: {}",
                        device_id,
                        e
                    );
                    None
                }
            }
        };

        let transition = Transition::for_step(step, live.as_ref());
        log::debug!(
            "Device {}: {:?}/{} -> {:?}/{} over {:?}",
            device_id,
            transition.start_color.channels(),
            transition.start_brightness,
            transition.target_color.channels(),
            transition.target_brightness,
            transition.duration
        );

        self.drive(device_id, &transition).await;
    }

    async fn power_off(&self, device_id: DeviceId, step: &CueStep) {
        let ticks = transition_ticks_from_secs(step.transition_duration);
        if let Err(e) = self
            .transport
            .set_state(device_id, &StateUpdate::power_off(ticks))
            .await
        {
            log::warn!("Failed to turn off device {}: {}", device_id, e);
        }
    }

    /// Write one interpolated frame per tick until progress reaches 1.
    ///
    /// The first frame goes out one interval after the start, except for a
    /// zero-length transition, which jumps to the target right away.
    pub async fn drive(&self, device_id: DeviceId, transition: &Transition) {
        let frames = transition.frame_count(self.frame_interval);
        let first_frame = if transition.duration.is_zero() {
            Instant::now()
        } else {
            Instant::now() + self.frame_interval
        };
        let mut ticker = interval_at(first_frame, self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut frame = 0u32;
        loop {
            ticker.tick().await;
            frame += 1;

            let progress = (frame as f64 / frames as f64).min(1.0);
            let (color, brightness) = transition.sample(progress);

            if let Err(e) = self
                .transport
                .set_state(device_id, &StateUpdate::frame(color, brightness))
                .await
            {
                log::warn!(
                    "Frame {}/{} to device {} failed: {}",
                    frame,
                    frames,
                    device_id,
                    e
                );
            }

            if progress >= 1.0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_step() -> CueStep {
        CueStep {
            order: 1,
            transition_duration: 1.0,
            start_color: Some(Color::black()),
            start_brightness: Some(0),
            target_color: Some(Color::rgbw(255, 100, 50, 0)),
            target_brightness: Some(200),
            device_ids: vec![1],
            ..Default::default()
        }
    }

    #[test]
    fn test_sample_is_linear_per_channel() {
        let transition = Transition::for_step(&ramp_step(), None);

        assert_eq!(transition.sample(0.0), (Color::black(), 0));
        assert_eq!(transition.sample(0.5), (Color::rgbw(128, 50, 25, 0), 100));
        assert_eq!(
            transition.sample(1.0),
            (Color::rgbw(255, 100, 50, 0), 200)
        );

        for i in 0..=20 {
            let p = i as f64 / 20.0;
            let (color, brightness) = transition.sample(p);
            let expected = [255.0, 100.0, 50.0, 0.0];
            for (channel, target) in color.channels().iter().zip(expected) {
                assert!((*channel as f64 - (p * target).round()).abs() <= 1.0);
            }
            assert!((brightness as f64 - (p * 200.0).round()).abs() <= 1.0);
        }
    }

    #[test]
    fn test_start_values_prefer_explicit_then_live_then_default() {
        let live = DeviceState {
            on: true,
            brightness: 77,
            color: Color::rgbw(1, 2, 3, 4),
        };

        let mut step = ramp_step();
        step.start_brightness = None;
        assert_eq!(
            resolve_start_values(&step, Some(&live)),
            (Color::black(), 77)
        );

        step.start_color = None;
        assert_eq!(
            resolve_start_values(&step, Some(&live)),
            (Color::rgbw(1, 2, 3, 4), 77)
        );
        assert_eq!(
            resolve_start_values(&step, None),
            (DEFAULT_START_COLOR, DEFAULT_START_BRIGHTNESS)
        );
    }

    #[test]
    fn test_missing_targets_keep_start() {
        let mut step = ramp_step();
        step.target_color = None;
        let (color, brightness) = resolve_target_values(&step, Color::rgbw(9, 9, 9, 9), 10);
        assert_eq!(color, Color::rgbw(9, 9, 9, 9));
        assert_eq!(brightness, 200);

        step.target_color = Some(Color::rgbw(0, 0, 255, 0));
        step.target_brightness = None;
        let (color, brightness) = resolve_target_values(&step, Color::black(), 42);
        assert_eq!(color, Color::rgbw(0, 0, 255, 0));
        assert_eq!(brightness, 42);
    }

    #[test]
    fn test_frame_count() {
        let interval = Duration::from_millis(33);
        let mut transition = Transition::for_step(&ramp_step(), None);
        assert_eq!(transition.frame_count(interval), 31);

        transition.duration = Duration::from_millis(66);
        assert_eq!(transition.frame_count(interval), 2);

        transition.duration = Duration::ZERO;
        assert_eq!(transition.frame_count(interval), 1);
    }
}

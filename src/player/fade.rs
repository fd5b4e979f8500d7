//! Stepped volume fades.

use crate::device::api::DeviceControl;
use crate::device::models::{DeviceDescriptor, TargetVolume, VolumeTarget};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const LOG_TARGET: &str = "r_chimetts::player::fade";

/// Interval between fade steps unless configured otherwise.
pub const DEFAULT_FADE_STEP: Duration = Duration::from_millis(500);

/// Which volume each device should end up at.
#[derive(Debug, Clone, PartialEq)]
pub enum FadeTarget {
    /// Explicit level(s), resolved per device.
    Volume(VolumeTarget),
    /// Each device's requested playback volume.
    Playback,
    /// Each device's volume from before the request.
    Initial,
}

impl FadeTarget {
    fn resolve(&self, device: &DeviceDescriptor) -> TargetVolume {
        match self {
            FadeTarget::Volume(target) => target.resolve(&device.id),
            FadeTarget::Playback => device.target_volume,
            FadeTarget::Initial => device.initial_target(),
        }
    }
}

/// Volumes for each of `count` steps from `current` to `target`.
///
/// Intermediate values are evenly spaced; the last value is exactly `target`.
pub fn fade_steps(current: f64, target: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let step = (target - current) / count as f64;
    let mut steps: Vec<f64> = (1..count).map(|i| current + step * i as f64).collect();
    steps.push(target);
    steps
}

/// Number of steps for a fade of `duration` at `step_interval`.
pub fn step_count(duration: Duration, step_interval: Duration) -> usize {
    if duration.is_zero() || step_interval.is_zero() {
        return 1;
    }
    (duration.as_secs_f64() / step_interval.as_secs_f64()).ceil() as usize
}

/// Clamps to zero and rounds to 4 decimal places, the precision sent to devices.
pub fn dispatch_volume(level: f64) -> f64 {
    (level.max(0.0) * 10_000.0).round() / 10_000.0
}

/// Glides device volumes to a target over a duration.
#[derive(Clone)]
pub struct VolumeFader {
    control: Arc<dyn DeviceControl>,
    step_interval: Duration,
}

impl VolumeFader {
    pub fn new(control: Arc<dyn DeviceControl>, step_interval: Duration) -> Self {
        Self {
            control,
            step_interval,
        }
    }

    /// Moves every device to its resolved target.
    ///
    /// With a zero duration, or one no longer than a single step, devices are
    /// set directly. Otherwise each device's steps are planned once from its
    /// current volume and issued one step per interval, with no sleep after
    /// the last step. Devices already at their target, devices with an
    /// unchanged target and devices that cannot be read are left out.
    /// Failed volume commands are logged and the fade carries on.
    #[instrument(skip(self, devices), fields(devices = devices.len()))]
    pub async fn fade(&self, devices: &[DeviceDescriptor], target: &FadeTarget, duration: Duration) {
        if devices.is_empty() {
            return;
        }

        let steps = step_count(duration, self.step_interval);
        let delay = duration / steps as u32;

        let mut plans: Vec<(&str, Vec<f64>)> = Vec::new();
        for device in devices {
            let TargetVolume::Level(level) = target.resolve(device) else {
                continue;
            };
            let Some(current) = self.current_volume(&device.id).await else {
                continue;
            };
            if level == current {
                debug!(target: LOG_TARGET, "{} is already at volume {}", device.id, level);
                continue;
            }
            if steps > 1 {
                debug!(
                    target: LOG_TARGET,
                    "Fading {} {}'s volume from {} to {} over {:?}",
                    if level > current { "in" } else { "out" },
                    device.id,
                    current,
                    level,
                    duration
                );
            } else {
                debug!(
                    target: LOG_TARGET,
                    "{} {}'s volume from {} to {}",
                    if level > current { "Increasing" } else { "Decreasing" },
                    device.id,
                    current,
                    level
                );
            }
            plans.push((device.id.as_str(), fade_steps(current, level, steps)));
        }

        if plans.is_empty() {
            return;
        }

        for step in 0..steps {
            for (entity_id, volumes) in &plans {
                let volume = dispatch_volume(volumes[step]);
                if let Err(e) = self.control.set_volume(entity_id, volume).await {
                    warn!(target: LOG_TARGET, "Unable to set {}'s volume to {}: {}", entity_id, volume, e);
                }
            }
            if step + 1 < steps {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn current_volume(&self, entity_id: &str) -> Option<f64> {
        match self.control.get_state(entity_id).await {
            Ok(Some(state)) => Some(state.volume_level().unwrap_or(0.0)),
            Ok(None) => {
                warn!(target: LOG_TARGET, "Device {} not found, skipping volume change", entity_id);
                None
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Unable to read {}'s volume: {}", entity_id, e);
                None
            }
        }
    }
}

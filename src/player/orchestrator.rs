//! Drives a set of devices through one playback request.

use crate::device::api::DeviceControl;
use crate::device::models::{DeviceDescriptor, TargetVolume, VolumeTarget, STATE_OFF, STATE_PLAYING};
use crate::device::platform::PlatformFamily;
use crate::device::prober::DeviceProber;
use crate::player::fade::{FadeTarget, VolumeFader};
use crate::player::sync_waiter::{SyncWaiter, DEFAULT_STATE_TIMEOUT, DEFAULT_VOLUME_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const LOG_TARGET: &str = "r_chimetts::player::orchestrator";

/// Extra time allowed on top of the audio duration for playback to finish.
pub const PLAYBACK_MARGIN: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOptions {
    /// Fade duration for volume changes; zero sets volumes directly.
    pub fade: Duration,
    /// Group capable devices under one primary before playing.
    pub join: bool,
    /// Ask devices to play the audio as an announcement.
    pub announce: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            fade: Duration::ZERO,
            join: false,
            announce: false,
        }
    }
}

/// What happened during [`PlaybackOrchestrator::play`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Primary device when the targets were joined.
    pub joined_primary: Option<String>,
    pub dispatched: bool,
    pub started: bool,
    pub finished: bool,
}

pub struct PlaybackOrchestrator {
    control: Arc<dyn DeviceControl>,
    prober: DeviceProber,
    fader: VolumeFader,
    waiter: SyncWaiter,
}

impl PlaybackOrchestrator {
    pub fn new(control: Arc<dyn DeviceControl>, fade_step: Duration, poll_interval: Duration) -> Self {
        Self {
            prober: DeviceProber::new(control.clone()),
            fader: VolumeFader::new(control.clone(), fade_step),
            waiter: SyncWaiter::new(control.clone(), poll_interval),
            control,
        }
    }

    pub fn waiter(&self) -> &SyncWaiter {
        &self.waiter
    }

    pub fn fader(&self) -> &VolumeFader {
        &self.fader
    }

    /// Turns on devices that are off, then classifies every known device.
    #[instrument(skip(self, entity_ids, volume))]
    pub async fn prepare(&self, entity_ids: &[String], volume: &VolumeTarget) -> Vec<DeviceDescriptor> {
        let mut turned_on = Vec::new();
        for entity_id in entity_ids {
            match self.control.get_state(entity_id).await {
                Ok(Some(state)) if state.is_off() => {
                    info!(target: LOG_TARGET, "Media player entity \"{}\" is turned off. Turning on...", entity_id);
                    match self.control.turn_on(entity_id).await {
                        Ok(()) => turned_on.push(entity_id.clone()),
                        Err(e) => warn!(target: LOG_TARGET, "Unable to turn on {}: {}", entity_id, e),
                    }
                }
                _ => {}
            }
        }
        if !turned_on.is_empty() {
            self.waiter
                .wait_for_state_not(&turned_on, STATE_OFF, DEFAULT_STATE_TIMEOUT)
                .await;
        }
        self.prober.classify_all(entity_ids, volume).await
    }

    /// Joins every group-capable device under the first one.
    ///
    /// Returns the primary device id, or `None` when fewer than two devices
    /// support grouping or the join command fails.
    #[instrument(skip(self, devices))]
    pub async fn join(&self, devices: &[DeviceDescriptor]) -> Option<String> {
        let members: Vec<String> = devices
            .iter()
            .filter(|d| d.capabilities.group)
            .map(|d| d.id.clone())
            .collect();
        if members.len() < 2 {
            warn!(
                target: LOG_TARGET,
                "Only {} media player(s) support grouping. Unable to join.",
                members.len()
            );
            return None;
        }
        let primary = members[0].clone();
        debug!(target: LOG_TARGET, "Joining {} media players under {}", members.len(), primary);
        match self.control.join(&primary, &members).await {
            Ok(()) => Some(primary),
            Err(e) => {
                warn!(target: LOG_TARGET, "Error joining media players {:?}: {}", members, e);
                None
            }
        }
    }

    /// Moves devices to their playback volume.
    ///
    /// Without a fade, waits for each device to report its new volume.
    pub async fn apply_playback_volume(&self, devices: &[DeviceDescriptor], fade: Duration) {
        let changing: Vec<DeviceDescriptor> = devices
            .iter()
            .filter(|d| d.should_change_volume())
            .cloned()
            .collect();
        if changing.is_empty() {
            return;
        }
        self.fader.fade(&changing, &FadeTarget::Playback, fade).await;
        if fade.is_zero() {
            for device in &changing {
                if let TargetVolume::Level(level) = device.target_volume {
                    if device.initial_volume != Some(level) {
                        self.waiter
                            .wait_for_volume(std::slice::from_ref(&device.id), level, DEFAULT_VOLUME_TIMEOUT)
                            .await;
                    }
                }
            }
        }
    }

    /// Restores devices to the volume they had before the request.
    pub async fn restore_volume(&self, devices: &[DeviceDescriptor], fade: Duration) {
        let changing: Vec<DeviceDescriptor> = devices
            .iter()
            .filter(|d| d.should_change_volume())
            .cloned()
            .collect();
        if !changing.is_empty() {
            self.fader.fade(&changing, &FadeTarget::Initial, fade).await;
        }
    }

    /// Plays `media_content_id` on `devices` and waits for it to finish.
    ///
    /// Sequence: optional join, playback volume, dispatch, wait until
    /// playing, wait until no longer playing (audio duration plus a margin),
    /// restore volumes. Individual failures are logged; the sequence carries
    /// on so volumes are restored whenever they were changed.
    #[instrument(skip(self, devices, options), fields(devices = devices.len()))]
    pub async fn play(
        &self,
        devices: &[DeviceDescriptor],
        media_content_id: &str,
        audio_duration: Duration,
        options: &PlaybackOptions,
    ) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        if devices.is_empty() {
            warn!(target: LOG_TARGET, "No media players to play on");
            return report;
        }

        let entity_ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
        let mut targets = entity_ids.clone();
        if options.join {
            report.joined_primary = self.join(devices).await;
            if let Some(primary) = &report.joined_primary {
                let ungrouped = devices
                    .iter()
                    .filter(|d| !d.capabilities.group)
                    .map(|d| d.id.clone());
                targets = std::iter::once(primary.clone()).chain(ungrouped).collect();
            }
        }

        self.apply_playback_volume(devices, options.fade).await;

        let mut playing = Vec::new();
        for (family, group) in group_by_family(&targets, devices) {
            let announce = options.announce && group_supports_announce(&group, devices);
            if options.announce && !announce {
                debug!(
                    target: LOG_TARGET,
                    "Not every {} media player supports announcements; playing normally", family
                );
            }
            info!(target: LOG_TARGET, "Playing {} on {} ({})", media_content_id, group.join(", "), family);
            match self.control.play_media(family, &group, media_content_id, announce).await {
                Ok(()) => playing.extend(group),
                Err(e) => warn!(target: LOG_TARGET, "Unable to play {} on {:?}: {}", media_content_id, group, e),
            }
        }
        report.dispatched = !playing.is_empty();
        let targets = playing;

        if report.dispatched {
            report.started = self
                .waiter
                .wait_for_state(&targets, STATE_PLAYING, DEFAULT_STATE_TIMEOUT)
                .await;
            report.finished = self
                .waiter
                .wait_for_state_not(&targets, STATE_PLAYING, audio_duration + PLAYBACK_MARGIN)
                .await;
        }

        self.restore_volume(devices, options.fade).await;
        info!(
            target: LOG_TARGET,
            "Playback on {} device(s): started={}, finished={}",
            devices.len(),
            report.started,
            report.finished
        );
        report
    }
}

/// Splits playback targets by platform family, keeping first-seen order.
///
/// Targets with no descriptor are treated as standard players.
pub fn group_by_family(targets: &[String], devices: &[DeviceDescriptor]) -> Vec<(PlatformFamily, Vec<String>)> {
    let mut groups: Vec<(PlatformFamily, Vec<String>)> = Vec::new();
    for target in targets {
        let family = devices
            .iter()
            .find(|d| &d.id == target)
            .map_or(PlatformFamily::Standard, |d| d.platform);
        match groups.iter_mut().find(|(f, _)| *f == family) {
            Some((_, ids)) => ids.push(target.clone()),
            None => groups.push((family, vec![target.clone()])),
        }
    }
    groups
}

fn group_supports_announce(group: &[String], devices: &[DeviceDescriptor]) -> bool {
    group.iter().all(|id| {
        devices
            .iter()
            .find(|d| &d.id == id)
            .map_or(false, |d| d.capabilities.announce)
    })
}

//! Integration tests for device preparation, fades, waits and playback
//!
//! These tests drive the player against in-memory media players.

use crate::test_utils::constants::{ECHO, KITCHEN, OFFICE};
use crate::test_utils::{Command, MockDevices};
use r_chimetts::device::{
    DeviceControl, DeviceState, PlatformFamily, TargetVolume, VolumeTarget, FEATURE_GROUPING,
    FEATURE_MEDIA_ANNOUNCE, FEATURE_VOLUME_SET,
};
use r_chimetts::player::{FadeTarget, PlaybackOptions, PlaybackOrchestrator, SyncWaiter, VolumeFader};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(10);
const FADE_STEP: Duration = Duration::from_millis(25);
const CONTENT_ID: &str = "media-source://media_source/local/chime_tts/test.mp3";

fn speaker(entity_id: &str, volume: f64, features: u64) -> DeviceState {
    DeviceState::new(entity_id, "idle")
        .with_volume(volume)
        .with_features(features)
}

fn orchestrator(mock: &Arc<MockDevices>) -> PlaybackOrchestrator {
    let control: Arc<dyn DeviceControl> = mock.clone();
    PlaybackOrchestrator::new(control, FADE_STEP, POLL)
}

fn ids(entity_ids: &[&str]) -> Vec<String> {
    entity_ids.iter().map(|id| id.to_string()).collect()
}

fn assert_volumes(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{:?} vs {:?}", actual, expected);
    }
}

#[cfg(test)]
mod playback_integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_turns_on_devices_that_are_off() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(DeviceState::new(KITCHEN, "off").with_volume(0.3).with_features(FEATURE_VOLUME_SET))
                .with_device(speaker(OFFICE, 0.4, FEATURE_VOLUME_SET)),
        );
        let player = orchestrator(&mock);

        let devices = player
            .prepare(&ids(&[KITCHEN, OFFICE]), &VolumeTarget::All(0.5))
            .await;

        assert_eq!(mock.commands(), vec![Command::TurnOn(KITCHEN.to_string())]);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, KITCHEN);
        assert_eq!(devices[0].initial_volume, Some(0.3));
        assert_eq!(devices[0].target_volume, TargetVolume::Level(0.5));
        assert!(devices[0].capabilities.volume);
        assert!(!devices[0].capabilities.group);
    }

    #[tokio::test]
    async fn test_prepare_skips_unknown_devices_and_resolves_platforms() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(speaker(ECHO, 0.3, FEATURE_VOLUME_SET))
                .with_platform(ECHO, "alexa_media"),
        );
        let player = orchestrator(&mock);

        let devices = player
            .prepare(&ids(&["media_player.ghost", ECHO]), &VolumeTarget::default())
            .await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].platform, PlatformFamily::VoiceAssistant);
        assert_eq!(devices[0].platform_name.as_deref(), Some("alexa_media"));
        assert!(devices[0].target_volume.is_unchanged());
    }

    #[tokio::test]
    async fn test_fade_steps_volume_to_target() {
        let mock = Arc::new(MockDevices::new().with_device(speaker(KITCHEN, 0.2, FEATURE_VOLUME_SET)));
        let player = orchestrator(&mock);
        let devices = player.prepare(&ids(&[KITCHEN]), &VolumeTarget::All(0.8)).await;

        let control: Arc<dyn DeviceControl> = mock.clone();
        let fader = VolumeFader::new(control, FADE_STEP);
        let started = Instant::now();
        fader
            .fade(&devices, &FadeTarget::Playback, Duration::from_millis(100))
            .await;

        assert_volumes(&mock.volume_commands(KITCHEN), &[0.35, 0.5, 0.65, 0.8]);
        // Three sleeps between four steps.
        assert!(started.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn test_fade_leaves_devices_at_target_or_unchanged() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(speaker(KITCHEN, 0.5, FEATURE_VOLUME_SET))
                .with_device(speaker(OFFICE, 0.3, FEATURE_VOLUME_SET)),
        );
        let player = orchestrator(&mock);
        let targets = VolumeTarget::PerDevice([(KITCHEN.to_string(), 0.5)].into_iter().collect());
        let devices = player.prepare(&ids(&[KITCHEN, OFFICE]), &targets).await;
        assert!(devices[1].target_volume.is_unchanged());

        player
            .fader()
            .fade(&devices, &FadeTarget::Playback, Duration::from_millis(100))
            .await;

        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_direct_volume_set_without_fade() {
        let mock = Arc::new(MockDevices::new().with_device(speaker(KITCHEN, 0.2, FEATURE_VOLUME_SET)));
        let player = orchestrator(&mock);
        let devices = player.prepare(&ids(&[KITCHEN]), &VolumeTarget::All(0.7)).await;

        player
            .fader()
            .fade(&devices, &FadeTarget::Volume(VolumeTarget::All(0.123456)), Duration::ZERO)
            .await;

        assert_eq!(mock.volume_commands(KITCHEN), vec![0.1235]);
    }

    #[tokio::test]
    async fn test_waiter_times_out_within_budget() {
        let mock = Arc::new(MockDevices::new().with_device(speaker(KITCHEN, 0.2, 0)));
        let control: Arc<dyn DeviceControl> = mock.clone();
        let waiter = SyncWaiter::new(control, Duration::from_millis(20));

        let started = Instant::now();
        let satisfied = waiter
            .wait_until(&ids(&[KITCHEN]), |_| false, Duration::from_millis(100))
            .await;
        let elapsed = started.elapsed();

        assert!(!satisfied);
        // Four sleeps: the final round spends the last of the budget without sleeping.
        assert!(elapsed >= Duration::from_millis(80), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_waiter_rejects_unknown_and_empty_ids() {
        let mock = Arc::new(MockDevices::new().with_device(speaker(KITCHEN, 0.2, 0)));
        let control: Arc<dyn DeviceControl> = mock.clone();
        let waiter = SyncWaiter::new(control, POLL);

        let started = Instant::now();
        assert!(
            !waiter
                .wait_for_state(&ids(&[KITCHEN, "media_player.ghost"]), "idle", Duration::from_secs(5))
                .await
        );
        assert!(!waiter.wait_for_state(&[], "idle", Duration::from_secs(5)).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_waiter_succeeds_when_already_satisfied() {
        let mock = Arc::new(MockDevices::new().with_device(speaker(KITCHEN, 0.25, 0)));
        let control: Arc<dyn DeviceControl> = mock.clone();
        let waiter = SyncWaiter::new(control, POLL);

        assert!(waiter.wait_for_state_not(&ids(&[KITCHEN]), "off", Duration::from_secs(1)).await);
        assert!(waiter.wait_for_volume(&ids(&[KITCHEN]), 0.2501, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_join_groups_capable_devices_under_first() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(speaker(KITCHEN, 0.2, FEATURE_GROUPING))
                .with_device(speaker(ECHO, 0.2, 0))
                .with_device(speaker(OFFICE, 0.2, FEATURE_GROUPING)),
        );
        let player = orchestrator(&mock);
        let devices = player
            .prepare(&ids(&[KITCHEN, ECHO, OFFICE]), &VolumeTarget::default())
            .await;

        let primary = player.join(&devices).await;

        assert_eq!(primary.as_deref(), Some(KITCHEN));
        assert_eq!(
            mock.commands(),
            vec![Command::Join(KITCHEN.to_string(), ids(&[KITCHEN, OFFICE]))]
        );
    }

    #[tokio::test]
    async fn test_join_needs_two_capable_devices() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(speaker(KITCHEN, 0.2, FEATURE_GROUPING))
                .with_device(speaker(OFFICE, 0.2, 0)),
        );
        let player = orchestrator(&mock);
        let devices = player
            .prepare(&ids(&[KITCHEN, OFFICE]), &VolumeTarget::default())
            .await;

        assert_eq!(player.join(&devices).await, None);
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_play_sets_volume_dispatches_and_restores() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(speaker(KITCHEN, 0.2, FEATURE_VOLUME_SET | FEATURE_MEDIA_ANNOUNCE))
                .with_play_polls(3),
        );
        let player = orchestrator(&mock);
        let devices = player.prepare(&ids(&[KITCHEN]), &VolumeTarget::All(0.6)).await;

        let options = PlaybackOptions {
            announce: true,
            ..PlaybackOptions::default()
        };
        let report = player
            .play(&devices, CONTENT_ID, Duration::from_millis(500), &options)
            .await;

        assert!(report.dispatched);
        assert!(report.started);
        assert!(report.finished);
        assert_eq!(report.joined_primary, None);
        assert_eq!(
            mock.commands(),
            vec![
                Command::SetVolume(KITCHEN.to_string(), 0.6),
                Command::PlayMedia(PlatformFamily::Standard, ids(&[KITCHEN]), CONTENT_ID.to_string(), true),
                Command::SetVolume(KITCHEN.to_string(), 0.2),
            ]
        );
        assert_eq!(mock.state(KITCHEN).map(|s| s.state), Some("idle".to_string()));
    }

    #[tokio::test]
    async fn test_play_joined_targets_primary_and_ungrouped() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(speaker(KITCHEN, 0.2, FEATURE_GROUPING | FEATURE_MEDIA_ANNOUNCE))
                .with_device(speaker(OFFICE, 0.2, FEATURE_GROUPING | FEATURE_MEDIA_ANNOUNCE))
                .with_device(speaker(ECHO, 0.2, 0)),
        );
        let player = orchestrator(&mock);
        let devices = player
            .prepare(&ids(&[KITCHEN, OFFICE, ECHO]), &VolumeTarget::default())
            .await;

        let options = PlaybackOptions {
            join: true,
            announce: true,
            ..PlaybackOptions::default()
        };
        let report = player
            .play(&devices, CONTENT_ID, Duration::from_millis(500), &options)
            .await;

        assert_eq!(report.joined_primary.as_deref(), Some(KITCHEN));
        let commands = mock.commands();
        assert_eq!(commands[0], Command::Join(KITCHEN.to_string(), ids(&[KITCHEN, OFFICE])));
        // The echo lacks announce support, so its group plays normally.
        assert_eq!(
            commands[1],
            Command::PlayMedia(
                PlatformFamily::Standard,
                ids(&[KITCHEN, ECHO]),
                CONTENT_ID.to_string(),
                false
            )
        );
        assert_eq!(commands.len(), 2);
    }

    #[tokio::test]
    async fn test_play_dispatches_each_platform_family_separately() {
        let mock = Arc::new(
            MockDevices::new()
                .with_device(speaker(KITCHEN, 0.2, FEATURE_MEDIA_ANNOUNCE))
                .with_device(speaker(ECHO, 0.2, FEATURE_MEDIA_ANNOUNCE))
                .with_platform(ECHO, "alexa_media")
                .with_device(speaker(OFFICE, 0.2, FEATURE_MEDIA_ANNOUNCE))
                .with_platform(OFFICE, "spotify"),
        );
        let player = orchestrator(&mock);
        let devices = player
            .prepare(&ids(&[KITCHEN, ECHO, OFFICE]), &VolumeTarget::default())
            .await;

        let options = PlaybackOptions {
            announce: true,
            ..PlaybackOptions::default()
        };
        let report = player
            .play(&devices, CONTENT_ID, Duration::from_millis(500), &options)
            .await;

        assert!(report.dispatched);
        let plays: Vec<Command> = mock
            .commands()
            .into_iter()
            .filter(|c| matches!(c, Command::PlayMedia(..)))
            .collect();
        assert_eq!(
            plays,
            vec![
                Command::PlayMedia(PlatformFamily::Standard, ids(&[KITCHEN]), CONTENT_ID.to_string(), true),
                Command::PlayMedia(
                    PlatformFamily::VoiceAssistant,
                    ids(&[ECHO]),
                    CONTENT_ID.to_string(),
                    true
                ),
                Command::PlayMedia(PlatformFamily::Streaming, ids(&[OFFICE]), CONTENT_ID.to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_play_with_no_devices_does_nothing() {
        let mock = Arc::new(MockDevices::new());
        let player = orchestrator(&mock);

        let report = player
            .play(&[], CONTENT_ID, Duration::from_millis(500), &PlaybackOptions::default())
            .await;

        assert!(!report.dispatched);
        assert!(mock.commands().is_empty());
    }
}

//! Device state read model and per-request device descriptors.

use crate::device::platform::PlatformFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `supported_features` bit for volume control.
pub const FEATURE_VOLUME_SET: u64 = 2;
/// `supported_features` bit for grouping (`media_player.join`).
pub const FEATURE_GROUPING: u64 = 524_288;
/// `supported_features` bit for announcements.
pub const FEATURE_MEDIA_ANNOUNCE: u64 = 1_048_576;

pub const STATE_OFF: &str = "off";
pub const STATE_PLAYING: &str = "playing";

/// Prefix that marks a file as served by the local media source.
const LOCAL_MEDIA_MARKER: &str = "/media/";
const LOCAL_MEDIA_SOURCE: &str = "media-source://media_source/local/";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_level: Option<f64>,
    #[serde(default)]
    pub supported_features: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

/// Live state of one device as reported by the remote registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: DeviceAttributes,
}

impl DeviceState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: DeviceAttributes::default(),
        }
    }

    pub fn with_volume(mut self, volume_level: f64) -> Self {
        self.attributes.volume_level = Some(volume_level);
        self
    }

    pub fn with_features(mut self, supported_features: u64) -> Self {
        self.attributes.supported_features = supported_features;
        self
    }

    pub fn with_media_duration(mut self, media_duration: f64) -> Self {
        self.attributes.media_duration = Some(media_duration);
        self
    }

    pub fn supports(&self, feature: u64) -> bool {
        self.attributes.supported_features & feature != 0
    }

    pub fn is_off(&self) -> bool {
        self.state == STATE_OFF
    }

    /// Playing with actual media. Some players report `playing` with a zero
    /// media duration while idle.
    pub fn is_playing(&self) -> bool {
        self.state == STATE_PLAYING && self.attributes.media_duration != Some(0.0)
    }

    pub fn volume_level(&self) -> Option<f64> {
        self.attributes.volume_level
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub volume: bool,
    pub group: bool,
    pub announce: bool,
}

impl DeviceCapabilities {
    pub fn from_features(supported_features: u64) -> Self {
        Self {
            volume: supported_features & FEATURE_VOLUME_SET != 0,
            group: supported_features & FEATURE_GROUPING != 0,
            announce: supported_features & FEATURE_MEDIA_ANNOUNCE != 0,
        }
    }
}

/// A volume to move a device to, or the sentinel for "leave it alone".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetVolume {
    Level(f64),
    Unchanged,
}

impl TargetVolume {
    /// Negative (or NaN) levels mean unchanged; levels above 1 are clamped.
    pub fn from_level(level: f64) -> Self {
        if level.is_nan() || level < 0.0 {
            TargetVolume::Unchanged
        } else {
            TargetVolume::Level(level.min(1.0))
        }
    }

    pub fn level(&self) -> Option<f64> {
        match self {
            TargetVolume::Level(level) => Some(*level),
            TargetVolume::Unchanged => None,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, TargetVolume::Unchanged)
    }
}

/// Requested playback volume: one level for every device or one per device.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeTarget {
    All(f64),
    PerDevice(BTreeMap<String, f64>),
}

impl VolumeTarget {
    /// Devices missing from a per-device map keep their volume.
    pub fn resolve(&self, entity_id: &str) -> TargetVolume {
        match self {
            VolumeTarget::All(level) => TargetVolume::from_level(*level),
            VolumeTarget::PerDevice(levels) => levels
                .get(entity_id)
                .map(|level| TargetVolume::from_level(*level))
                .unwrap_or(TargetVolume::Unchanged),
        }
    }
}

impl Default for VolumeTarget {
    fn default() -> Self {
        VolumeTarget::All(-1.0)
    }
}

/// One target device for the current request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub platform: PlatformFamily,
    pub platform_name: Option<String>,
    pub capabilities: DeviceCapabilities,
    /// Volume before this request touched the device.
    pub initial_volume: Option<f64>,
    pub target_volume: TargetVolume,
    pub is_playing: bool,
}

impl DeviceDescriptor {
    /// Streaming players always get their volume restored, even with no target.
    pub fn should_change_volume(&self) -> bool {
        !self.target_volume.is_unchanged() || self.platform == PlatformFamily::Streaming
    }

    pub fn initial_target(&self) -> TargetVolume {
        self.initial_volume
            .map(TargetVolume::from_level)
            .unwrap_or(TargetVolume::Unchanged)
    }
}

/// Maps a file under a `/media/` directory to its local media-source id.
pub fn media_content_id(file_path: &str) -> Option<String> {
    let index = file_path.find(LOCAL_MEDIA_MARKER)?;
    let relative = file_path[index + LOCAL_MEDIA_MARKER.len()..].replace("//", "/");
    Some(format!("{}{}", LOCAL_MEDIA_SOURCE, relative))
}

/// Path below the local media root for a `media-source://media_source/local/` id.
pub fn local_media_path(media_content_id: &str) -> Option<&str> {
    media_content_id.strip_prefix(LOCAL_MEDIA_SOURCE)
}

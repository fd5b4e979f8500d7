//! Platform families and the lookup table that resolves them.

use phf::phf_map;
use std::fmt;

/// How audio reaches a device. Resolved once from the integration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    /// Plays any media URL through the regular `play_media` service.
    Standard,
    /// Alexa-style integrations that need their own audio format and dispatch.
    VoiceAssistant,
    /// Speaker systems with native grouping and announcements.
    MultiRoom,
    /// Streaming-service players; volume is always restored after playback.
    Streaming,
}

impl PlatformFamily {
    /// Resolves a platform (integration) name; unknown names are standard players.
    pub fn from_platform(name: &str) -> Self {
        PLATFORM_FAMILIES
            .get(normalize_platform_name(name).as_str())
            .copied()
            .unwrap_or(PlatformFamily::Standard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFamily::Standard => "standard",
            PlatformFamily::VoiceAssistant => "voice_assistant",
            PlatformFamily::MultiRoom => "multi_room",
            PlatformFamily::Streaming => "streaming",
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercases and drops everything but letters and digits, so
/// `Alexa Media Player`, `alexa_media` and `alexa-media` all compare equal.
pub fn normalize_platform_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalised platform name to family.
static PLATFORM_FAMILIES: phf::Map<&'static str, PlatformFamily> = phf_map! {
    "alexamedia" => PlatformFamily::VoiceAssistant,
    "alexamediaplayer" => PlatformFamily::VoiceAssistant,
    "alexa" => PlatformFamily::VoiceAssistant,
    "sonos" => PlatformFamily::MultiRoom,
    "spotify" => PlatformFamily::Streaming,
    "spotcast" => PlatformFamily::Streaming,
};

//! Command-line interface implementation

use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::device::VolumeTarget;
use crate::player::{PlaybackOptions, PlaybackReport};
use std::time::Duration;

/// Command-line arguments for r-chimetts
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(author, version, about = "Chime and TTS announcements for Home Assistant media players", long_about = None)]
pub struct Args {
    /// Message to speak; may be a structured segment list
    #[arg(short, long)]
    pub message: Option<String>,

    /// Chime played before the message
    #[arg(long)]
    pub chime: Option<String>,

    /// Chime played after the message
    #[arg(long)]
    pub end_chime: Option<String>,

    /// Media player entity ids to play on (comma separated or repeated)
    #[arg(short, long = "entity-id", value_delimiter = ',')]
    pub entity_ids: Vec<String>,

    /// Playback volume between 0 and 1; unset keeps current volumes
    #[arg(long)]
    pub volume: Option<f64>,

    /// Volume fade duration in milliseconds
    #[arg(long, default_value_t = 0)]
    pub fade_ms: u64,

    /// Group capable media players before playing
    #[arg(long)]
    pub join: bool,

    /// Play as an announcement where every media player supports it
    #[arg(long)]
    pub announce: bool,

    /// TTS speed in percent
    #[arg(long, default_value_t = 100.0)]
    pub speed: f64,

    /// TTS pitch shift in semitones
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub pitch: f64,

    /// Offset between segments in milliseconds; negative values overlap
    #[arg(long, allow_negative_numbers = true)]
    pub offset: Option<f64>,

    /// Silence appended to the end of the audio in milliseconds
    #[arg(long, default_value_t = 0.0)]
    pub final_delay: f64,

    /// Conversion preset: alexa, "volume N%", custom, or raw transcoder arguments
    #[arg(long, allow_hyphen_values = true)]
    pub audio_conversion: Option<String>,

    /// Where to write the rendered audio
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Home Assistant URL
    #[arg(short, long, env = "CHIMETTS_SERVER_URL")]
    pub server_url: Option<String>,

    /// Home Assistant long-lived access token
    #[arg(short, long, env = "CHIMETTS_TOKEN")]
    pub token: Option<String>,

    /// TTS platform or tts.* engine entity
    #[arg(long, env = "CHIMETTS_TTS_PLATFORM")]
    pub tts_platform: Option<String>,

    /// Transcoder executable
    #[arg(long, env = "CHIMETTS_FFMPEG")]
    pub ffmpeg: Option<String>,

    /// Config file path
    #[arg(short, long, env = "CHIMETTS_CONFIG")]
    pub config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "CHIMETTS_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    /// Config file named on the command line, or the default location.
    pub fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => Path::new(path).to_path_buf(),
            None => Settings::default_path(),
        }
    }

    /// Overrides file settings with values given on the command line or environment.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(server_url) = &self.server_url {
            settings.server_url = server_url.clone();
        }
        if let Some(token) = &self.token {
            settings.access_token = Some(token.clone());
        }
        if let Some(tts_platform) = &self.tts_platform {
            settings.tts_platform = Some(tts_platform.clone());
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            settings.ffmpeg_path = ffmpeg.clone();
        }
        if let Some(offset) = self.offset {
            settings.offset_ms = offset;
        }
    }

    pub fn volume_target(&self) -> VolumeTarget {
        self.volume.map(VolumeTarget::All).unwrap_or_default()
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            fade: Duration::from_millis(self.fade_ms),
            join: self.join,
            announce: self.announce,
        }
    }
}

/// CLI user interface for interacting with the application
pub struct Cli {
    pub args: Args,
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}

impl Cli {
    /// Create a new CLI instance
    pub fn new() -> Self {
        Cli { args: Args::parse() }
    }

    /// Display where the rendered audio ended up
    pub fn display_output(&self, path: &Path, duration_ms: f64) {
        println!("Audio saved to {} ({:.0}ms)", path.display(), duration_ms);
    }

    /// Display playback results
    pub fn display_playback(&self, report: &PlaybackReport) {
        if let Some(primary) = &report.joined_primary {
            println!("Joined media players under {}", primary);
        }
        match (report.dispatched, report.started, report.finished) {
            (false, _, _) => println!("Playback could not be started"),
            (true, false, _) => println!("Playback was requested but never reported as playing"),
            (true, true, false) => println!("Playback started but did not finish in time"),
            (true, true, true) => println!("Playback finished."),
        }
    }

    /// Display error messages
    pub fn display_error(&self, error: &dyn Error) {
        eprintln!("{}", error_message(error));
    }
}

/// Renders an error and the causes its own message does not already show.
pub fn error_message(error: &dyn Error) -> String {
    let mut message = format!("Error: {}", error);
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(&format!("\n  caused by: {}", text));
        }
        source = cause.source();
    }
    message
}

use std::io;
use std::path::PathBuf;
use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

/// Error types specific to audio decoding, persistence and processing.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Symphonia error: {0}")]
    SymphoniaError(#[from] SymphoniaError),
    #[error("WAV error: {0}")]
    WavError(#[from] hound::Error),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Missing codec parameters: {0}")]
    MissingCodecParams(&'static str),
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),
    #[error("Resampling error: {0}")]
    ResamplingError(String),
    #[error("Async task join error: {0}")]
    TaskJoinError(String),
}

impl From<tokio::task::JoinError> for AudioError {
    fn from(e: tokio::task::JoinError) -> Self {
        AudioError::TaskJoinError(e.to_string())
    }
}

/// Why an external transcoder run did not produce usable audio.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("No audio available to convert")]
    MissingAudio,
    #[error("Playback speed {0}% is outside the supported range of 1% to 500%")]
    SpeedOutOfRange(f64),
    #[error("Source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },
    #[error("Unable to store audio to {}: {source}", path.display())]
    Persist { path: PathBuf, source: AudioError },
    #[error("Unable to start transcoder \"{command}\": {source}")]
    Spawn { command: String, source: io::Error },
    #[error("Transcoder failed (exit code {code:?}) running \"{command}\": {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Unable to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("Unable to load converted audio from {}: {source}", path.display())]
    Load { path: PathBuf, source: AudioError },
}

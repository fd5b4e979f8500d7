//! Scratch directory for intermediate audio files.

use crate::audio::buffer::AudioBuffer;
use crate::audio::decoder;
use crate::audio::error::AudioError;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, warn};
use uuid::Uuid;

const LOG_TARGET: &str = "r_chimetts::audio::scratch";

/// Prefix of every file created in the scratch directory.
pub const SCRATCH_FILE_PREFIX: &str = "chime_tts_";

/// Owns a directory where buffers are persisted for external tools.
///
/// Each call to [`ScratchDir::unique_path`] returns a fresh name, so
/// concurrent conversions never collide.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Opens (creating if needed) the scratch directory at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AudioError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(target: LOG_TARGET, "Using scratch directory {}", root.display());
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn unique_path(&self, extension: &str) -> PathBuf {
        self.root
            .join(format!("{}{}.{}", SCRATCH_FILE_PREFIX, Uuid::new_v4(), extension))
    }

    /// Writes `buffer` as a new 16-bit WAV file and returns its path.
    pub async fn save_wav(&self, buffer: &AudioBuffer) -> Result<PathBuf, AudioError> {
        let path = self.unique_path("wav");
        let target = path.clone();
        let buffer = buffer.clone();
        task::spawn_blocking(move || write_wav(&target, &buffer)).await??;
        Ok(path)
    }

    pub async fn load(&self, path: &Path) -> Result<AudioBuffer, AudioError> {
        decoder::load_file(path.to_path_buf()).await
    }

    /// Deletes `path` if it exists. Failures are logged, never raised.
    pub async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(target: LOG_TARGET, "Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(target: LOG_TARGET, "Unable to remove {}: {}", path.display(), e),
        }
    }
}

/// Writes `buffer` to `path` as 16-bit PCM WAV.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in buffer.samples() {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

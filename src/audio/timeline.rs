//! Folds rendered segments into a single buffer.

use crate::audio::buffer::AudioBuffer;
use crate::audio::error::{AudioError, TranscodeError};
use crate::audio::transcoder::Transcoder;
use crate::outcome::Outcome;
use crate::segment::{Segment, SegmentPayload};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const LOG_TARGET: &str = "r_chimetts::audio::timeline";

/// Format used for silence when there is no audio yet to match.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHANNELS: u16 = 1;

/// Extension assumed for chime paths that have none.
pub const DEFAULT_CHIME_EXTENSION: &str = "mp3";

pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

/// Produces speech audio for TTS segments.
#[async_trait]
pub trait SegmentRenderer: Send + Sync {
    /// Renders `message`. `options` holds the segment's extra keys (voice, language, ...).
    async fn render_tts(
        &self,
        message: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<AudioBuffer, RenderError>;
}

/// A segment that was dropped or left untransformed during assembly.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyIssue {
    #[error("unable to load chime {}: {source}", path.display())]
    Chime { path: PathBuf, source: AudioError },
    #[error("unable to render TTS audio for \"{message}\": {reason}")]
    Tts { message: String, reason: String },
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error("unable to combine audio: {0}")]
    Combine(#[from] AudioError),
}

/// Combines two optional buffers.
///
/// * `offset_ms == 0`: `a` then `b`.
/// * `offset_ms > 0`: `a`, that many milliseconds of silence, then `b`.
/// * `offset_ms < 0`: `b` starts `|offset_ms|` before the end of `a` (see [`overlay`]).
///
/// A missing operand yields the other one unchanged.
pub fn combine(
    a: Option<AudioBuffer>,
    b: Option<AudioBuffer>,
    offset_ms: f64,
) -> Result<Option<AudioBuffer>, AudioError> {
    match (a, b) {
        (None, b) => Ok(b),
        (a, None) => Ok(a),
        (Some(mut a), Some(b)) => {
            fold_into(&mut a, b, offset_ms)?;
            Ok(Some(a))
        }
    }
}

/// Mixes the first `overlap_ms` of `b` onto the end of `a`, then appends the
/// rest of `b` unmixed.
///
/// When `a` is shorter than the overlap, `b` starts at the beginning of `a`
/// and whatever of `b`'s first `overlap_ms` does not fit under `a` is dropped.
pub fn overlay(mut a: AudioBuffer, b: AudioBuffer, overlap_ms: f64) -> Result<AudioBuffer, AudioError> {
    let b = conform(&mut a, b)?;
    overlay_into(&mut a, &b, overlap_ms)?;
    Ok(a)
}

/// Appends `next` to `acc` with the [`combine`] offset rules.
///
/// On error `acc` still holds its previous audio, possibly in the shared format.
fn fold_into(acc: &mut AudioBuffer, next: AudioBuffer, offset_ms: f64) -> Result<(), AudioError> {
    let next = conform(acc, next)?;
    if offset_ms < 0.0 {
        return overlay_into(acc, &next, -offset_ms);
    }
    if offset_ms > 0.0 {
        let silence = AudioBuffer::silent(offset_ms, acc.sample_rate(), acc.channels());
        acc.append(&silence)?;
    }
    acc.append(&next)
}

/// Brings both buffers to the higher sample rate and channel count.
///
/// `acc` is only copied when it has to change format, and is left as it was
/// if that conversion fails.
fn conform(acc: &mut AudioBuffer, next: AudioBuffer) -> Result<AudioBuffer, AudioError> {
    let channels = acc.channels().max(next.channels());
    let sample_rate = acc.sample_rate().max(next.sample_rate());
    if acc.channels() != channels || acc.sample_rate() != sample_rate {
        *acc = acc.clone().with_channels(channels).with_sample_rate(sample_rate)?;
    }
    next.with_channels(channels).with_sample_rate(sample_rate)
}

fn overlay_into(acc: &mut AudioBuffer, b: &AudioBuffer, overlap_ms: f64) -> Result<(), AudioError> {
    let overlap = acc.frames_for_ms(overlap_ms);
    let position = acc.frames().saturating_sub(overlap);
    acc.mix_at(b, position)?;
    if b.frames() > overlap {
        acc.append(&b.slice_frames(overlap, b.frames()))?;
    }
    Ok(())
}

/// Renders segment lists into audio.
pub struct TimelineEngine {
    transcoder: Arc<Transcoder>,
    chimes_dir: Option<PathBuf>,
    tts_speed: f64,
    tts_pitch: f64,
}

impl TimelineEngine {
    pub fn new(transcoder: Arc<Transcoder>) -> Self {
        Self {
            transcoder,
            chimes_dir: None,
            tts_speed: 100.0,
            tts_pitch: 0.0,
        }
    }

    /// Directory searched for chimes given as a bare file name.
    pub fn with_chimes_dir(mut self, chimes_dir: Option<PathBuf>) -> Self {
        self.chimes_dir = chimes_dir;
        self
    }

    /// Speed and pitch for TTS segments that do not set their own.
    pub fn with_tts_defaults(mut self, speed: f64, pitch: f64) -> Self {
        self.tts_speed = speed;
        self.tts_pitch = pitch;
        self
    }

    pub fn resolve_chime_path(&self, path: &str) -> PathBuf {
        let mut resolved = PathBuf::from(path);
        if resolved.extension().is_none() {
            resolved.set_extension(DEFAULT_CHIME_EXTENSION);
        }
        match &self.chimes_dir {
            Some(dir) if resolved.parent().map_or(true, |p| p.as_os_str().is_empty()) => dir.join(resolved),
            _ => resolved,
        }
    }

    /// Renders and folds `segments` in order, then appends `final_delay_ms` of silence.
    ///
    /// Segments that fail to render are skipped; the reason is kept as a
    /// diagnostic. Returns `None` when nothing produced audio.
    #[instrument(skip(self, segments, renderer), fields(segment_count = segments.len()))]
    pub async fn assemble(
        &self,
        segments: &[Segment],
        renderer: &dyn SegmentRenderer,
        offset_ms: f64,
        final_delay_ms: f64,
    ) -> Outcome<Option<AudioBuffer>, AssemblyIssue> {
        let mut outcome: Outcome<(), AssemblyIssue> = Outcome::clean(());
        let mut output: Option<AudioBuffer> = None;

        for (index, segment) in segments.iter().enumerate() {
            let (audio, combine_offset) = match &segment.payload {
                SegmentPayload::Delay { length_ms } => {
                    debug!(target: LOG_TARGET, "Segment {}: delay of {}ms", index, length_ms);
                    (Some(silence_like(output.as_ref(), *length_ms)), 0.0)
                }
                SegmentPayload::Chime { path } => {
                    let path = self.resolve_chime_path(path);
                    debug!(target: LOG_TARGET, "Segment {}: chime {}", index, path.display());
                    let audio = match self.load_chime(&path).await {
                        Ok(audio) => {
                            self.transform(audio, segment.effective_speed(), segment.effective_pitch(), &mut outcome)
                                .await
                        }
                        Err(source) => {
                            warn!(target: LOG_TARGET, "Unable to load chime {}: {}", path.display(), source);
                            outcome.push_diagnostic(AssemblyIssue::Chime { path, source });
                            None
                        }
                    };
                    (audio, segment.offset_ms.unwrap_or(offset_ms))
                }
                SegmentPayload::Tts { message } => {
                    debug!(target: LOG_TARGET, "Segment {}: tts \"{}\"", index, message);
                    let audio = match renderer.render_tts(message, &segment.options).await {
                        Ok(audio) => {
                            let speed = segment.speed.unwrap_or(self.tts_speed);
                            let pitch = segment.pitch.unwrap_or(self.tts_pitch);
                            self.transform(audio, speed, pitch, &mut outcome).await
                        }
                        Err(e) => {
                            warn!(target: LOG_TARGET, "Unable to render TTS audio for \"{}\": {}", message, e);
                            outcome.push_diagnostic(AssemblyIssue::Tts {
                                message: message.clone(),
                                reason: e.to_string(),
                            });
                            None
                        }
                    };
                    (audio, segment.offset_ms.unwrap_or(offset_ms))
                }
            };

            let Some(audio) = audio else {
                continue;
            };
            match output.as_mut() {
                None => output = Some(audio),
                Some(acc) => {
                    if let Err(e) = fold_into(acc, audio, combine_offset) {
                        warn!(target: LOG_TARGET, "Unable to append segment {}: {}", index, e);
                        outcome.push_diagnostic(AssemblyIssue::Combine(e));
                    }
                }
            }
        }

        if final_delay_ms > 0.0 {
            if let Some(audio) = output.as_mut() {
                let silence = AudioBuffer::silent(final_delay_ms, audio.sample_rate(), audio.channels());
                if let Err(e) = audio.append(&silence) {
                    outcome.push_diagnostic(AssemblyIssue::Combine(e));
                }
            }
        }

        match &output {
            Some(audio) => info!(
                target: LOG_TARGET,
                "Assembled {:.0}ms of audio from {} segment(s)",
                audio.duration_ms(),
                segments.len()
            ),
            None => warn!(target: LOG_TARGET, "No audio was produced from {} segment(s)", segments.len()),
        }
        outcome.map(|_| output)
    }

    async fn load_chime(&self, path: &Path) -> Result<AudioBuffer, AudioError> {
        self.transcoder.scratch().load(path).await
    }

    async fn transform(
        &self,
        audio: AudioBuffer,
        speed: f64,
        pitch: f64,
        outcome: &mut Outcome<(), AssemblyIssue>,
    ) -> Option<AudioBuffer> {
        let (audio, issues) = self.transcoder.change_speed(Some(audio), speed).await.into_parts();
        issues.into_iter().for_each(|e| outcome.push_diagnostic(e.into()));
        let (audio, issues) = self.transcoder.change_pitch(audio, pitch).await.into_parts();
        issues.into_iter().for_each(|e| outcome.push_diagnostic(e.into()));
        audio
    }
}

fn silence_like(reference: Option<&AudioBuffer>, length_ms: f64) -> AudioBuffer {
    match reference {
        Some(audio) => AudioBuffer::silent(length_ms, audio.sample_rate(), audio.channels()),
        None => AudioBuffer::silent(length_ms, DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS),
    }
}

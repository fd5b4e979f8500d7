//! Decodes audio files into [`AudioBuffer`]s with Symphonia.

use crate::audio::buffer::AudioBuffer;
use crate::audio::error::AudioError;
use bytes::Bytes;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::task;
use tracing::{debug, instrument, trace, warn};

const LOG_TARGET: &str = "r_chimetts::audio::decoder";

/// Decodes the whole file at `path`. The extension is used as a format hint.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, AudioError> {
    let file = File::open(path)?;
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }
    debug!(target: LOG_TARGET, "Decoding audio file {}", path.display());
    decode_source(Box::new(file), hint)
}

/// Decodes an in-memory encoded file, e.g. a TTS response body.
pub fn decode_bytes(data: Bytes, extension: Option<&str>) -> Result<AudioBuffer, AudioError> {
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }
    decode_source(Box::new(Cursor::new(data)), hint)
}

/// Decodes `path` on the blocking thread pool.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn load_file(path: PathBuf) -> Result<AudioBuffer, AudioError> {
    task::spawn_blocking(move || decode_file(&path)).await?
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<AudioBuffer, AudioError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::UnsupportedFormat("No suitable audio track found".to_string()))?
        .clone();

    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(AudioError::MissingCodecParams("sample rate"))?;
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or(AudioError::MissingCodecParams("channels map"))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                trace!(target: LOG_TARGET, "End of stream");
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                warn!(target: LOG_TARGET, "Decoder reset required mid-stream; stopping at {} samples", samples.len());
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track.id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if decoded.frames() == 0 {
                    continue;
                }
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let frame_capacity = decoded.capacity();
                if sample_buf
                    .as_ref()
                    .map_or(true, |buf| buf.capacity() < frame_capacity * spec.channels.count())
                {
                    sample_buf = Some(SampleBuffer::new(frame_capacity as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(target: LOG_TARGET, "Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    debug!(
        target: LOG_TARGET,
        "Decoded {} samples ({} Hz, {} channel(s))",
        samples.len(),
        sample_rate,
        channels
    );
    AudioBuffer::new(samples, sample_rate, channels)
}

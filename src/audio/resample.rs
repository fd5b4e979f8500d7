use crate::audio::error::AudioError;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{instrument, trace};

const LOG_TARGET: &str = "r_chimetts::audio::resample";

/// Input frames handed to the resampler per call.
const CHUNK_SIZE: usize = 1024;

fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resamples interleaved `f32` audio from `from_rate` to `to_rate`.
///
/// The output holds exactly `ceil(frames * to_rate / from_rate)` frames; the
/// resampler's leading delay is dropped.
#[instrument(skip(samples), fields(sample_count = samples.len()))]
pub fn resample_interleaved(
    samples: &[f32],
    channels: usize,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, AudioError> {
    if from_rate == to_rate || samples.is_empty() || channels == 0 {
        return Ok(samples.to_vec());
    }

    let frames = samples.len() / channels;
    let ratio = to_rate as f64 / from_rate as f64;
    let expected_frames = (frames as f64 * ratio).ceil() as usize;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, sinc_parameters(), CHUNK_SIZE, channels)
        .map_err(|e| AudioError::ResamplingError(format!("Failed to create resampler: {}", e)))?;
    let delay = resampler.output_delay();

    let planar = deinterleave(samples, channels);
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames + delay); channels];

    let mut position = 0;
    while frames - position >= resampler.input_frames_next() {
        let end = position + resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[position..end]).collect();
        let processed = resampler
            .process(&chunk, None)
            .map_err(|e| AudioError::ResamplingError(e.to_string()))?;
        extend_planar(&mut output, processed);
        position = end;
    }

    if position < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[position..]).collect();
        let processed = resampler
            .process_partial(Some(&chunk), None)
            .map_err(|e| AudioError::ResamplingError(e.to_string()))?;
        extend_planar(&mut output, processed);
    }

    // Flush with silence until the delayed tail has come out.
    while output[0].len() < expected_frames + delay {
        let processed = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| AudioError::ResamplingError(e.to_string()))?;
        if processed.first().map_or(true, |ch| ch.is_empty()) {
            break;
        }
        extend_planar(&mut output, processed);
    }

    trace!(
        target: LOG_TARGET,
        "Resampled {} frames at {} Hz to {} frames at {} Hz (delay {})",
        frames, from_rate, expected_frames, to_rate, delay
    );

    let mut interleaved = Vec::with_capacity(expected_frames * channels);
    for frame in delay..delay + expected_frames {
        for ch in &output {
            interleaved.push(ch.get(frame).copied().unwrap_or(0.0));
        }
    }
    Ok(interleaved)
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }
    planar
}

fn extend_planar(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (target, chunk) in output.iter_mut().zip(processed) {
        target.extend_from_slice(&chunk);
    }
}

//! In-memory PCM audio.

use crate::audio::error::AudioError;
use crate::audio::resample;
use tracing::trace;

const LOG_TARGET: &str = "r_chimetts::audio::buffer";

/// Decoded PCM audio: interleaved `f32` samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wraps interleaved samples. The sample count must be a whole number of frames.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        if sample_rate == 0 || channels == 0 {
            return Err(AudioError::InvalidBuffer(format!(
                "sample rate ({}) and channel count ({}) must be positive",
                sample_rate, channels
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(AudioError::InvalidBuffer(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// `duration_ms` of digital silence. Panics never; zero rate or channels are raised to 1.
    pub fn silent(duration_ms: f64, sample_rate: u32, channels: u16) -> Self {
        let sample_rate = sample_rate.max(1);
        let channels = channels.max(1);
        let frames = ms_to_frames(duration_ms, sample_rate);
        Self {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Number of frames spanning `ms` milliseconds at this buffer's rate.
    pub fn frames_for_ms(&self, ms: f64) -> usize {
        ms_to_frames(ms, self.sample_rate)
    }

    /// Copies frames `start..end` (clamped to the buffer) into a new buffer.
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioBuffer {
        let channels = self.channels as usize;
        let end = end.min(self.frames());
        let start = start.min(end);
        AudioBuffer {
            samples: self.samples[start * channels..end * channels].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Appends another buffer of the same format.
    pub fn append(&mut self, other: &AudioBuffer) -> Result<(), AudioError> {
        self.ensure_same_format(other)?;
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Mixes `other` onto this buffer starting at `position` frames.
    ///
    /// The result keeps this buffer's length: whatever of `other` extends past
    /// the end is dropped. Summed samples saturate at full scale.
    pub fn mix_at(&mut self, other: &AudioBuffer, position: usize) -> Result<(), AudioError> {
        self.ensure_same_format(other)?;
        let start = position.min(self.frames()) * self.channels as usize;
        for (target, source) in self.samples[start..].iter_mut().zip(other.samples.iter()) {
            *target = (*target + *source).clamp(-1.0, 1.0);
        }
        Ok(())
    }

    /// Converts to `channels` channels: mono is duplicated, multi-channel to mono is averaged.
    pub fn with_channels(self, channels: u16) -> AudioBuffer {
        let channels = channels.max(1);
        if channels == self.channels {
            return self;
        }
        trace!(target: LOG_TARGET, "Converting {} channel(s) to {}", self.channels, channels);
        let source_channels = self.channels as usize;
        let frames = self.frames();
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for frame in self.samples.chunks_exact(source_channels) {
            if channels == 1 {
                samples.push(frame.iter().sum::<f32>() / source_channels as f32);
            } else {
                for ch in 0..channels as usize {
                    samples.push(frame[ch % source_channels]);
                }
            }
        }
        AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
            channels,
        }
    }

    /// Resamples to `sample_rate`.
    pub fn with_sample_rate(self, sample_rate: u32) -> Result<AudioBuffer, AudioError> {
        if sample_rate == self.sample_rate {
            return Ok(self);
        }
        let samples = resample::resample_interleaved(
            &self.samples,
            self.channels as usize,
            self.sample_rate,
            sample_rate,
        )?;
        AudioBuffer::new(samples, sample_rate, self.channels)
    }

    fn ensure_same_format(&self, other: &AudioBuffer) -> Result<(), AudioError> {
        if self.sample_rate != other.sample_rate || self.channels != other.channels {
            return Err(AudioError::InvalidBuffer(format!(
                "format mismatch: {} Hz/{} ch vs {} Hz/{} ch",
                self.sample_rate, self.channels, other.sample_rate, other.channels
            )));
        }
        Ok(())
    }
}

fn ms_to_frames(ms: f64, sample_rate: u32) -> usize {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    (ms * sample_rate as f64 / 1000.0).round() as usize
}

//! External transcoder (FFmpeg) invocation.

use crate::audio::buffer::AudioBuffer;
use crate::audio::error::TranscodeError;
use crate::audio::scratch::ScratchDir;
use crate::outcome::Outcome;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, instrument, warn};

const LOG_TARGET: &str = "r_chimetts::audio::transcoder";

/// Lowest factor the `atempo` filter accepts in a single stage.
pub const MIN_TEMPO_STAGE: f64 = 0.5;

/// Arguments producing audio that Alexa media players accept.
pub const ALEXA_CONVERSION_ARGS: &str = "-y -ac 2 -ar 24000 -b:a 48k -acodec libmp3lame -f mp3";

/// Loudness-normalising arguments; `X` is replaced by the volume factor.
pub const VOLUME_CONVERSION_ARGS: &str = "-af loudnorm -filter:a volume=X";

const CONVERTED_SUFFIX: &str = "_converted";

/// Transcoder argument string, e.g. `-af atempo=0.5 -f mp3`.
///
/// Building one is pure; nothing touches the filesystem until a
/// [`Transcoder`] runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSpec(String);

impl ConversionSpec {
    pub fn new(args: impl Into<String>) -> Self {
        Self(args.into().trim().to_string())
    }

    /// Tempo change by `tempo` (1.0 = unchanged).
    pub fn tempo(tempo: f64) -> Self {
        Self(append_tempo_filters(None, tempo))
    }

    /// Speed change in percent of the original.
    pub fn speed(speed_percent: f64) -> Self {
        Self::tempo(speed_percent / 100.0)
    }

    /// Pitch shift by `semitones` for audio sampled at `sample_rate`.
    ///
    /// `asetrate` raises the pitch and shortens the audio by the same ratio,
    /// so a tempo chain of `1 / ratio` restores the duration.
    pub fn pitch(semitones: f64, sample_rate: u32) -> Self {
        let ratio = 2f64.powf(semitones / 12.0);
        let args = format!("-af asetrate={}*{}", sample_rate, ratio);
        Self(append_tempo_filters(Some(args), 1.0 / ratio))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split_whitespace()
    }

    /// Output container requested with `-f <format>`, if any.
    pub fn output_format(&self) -> Option<&str> {
        let mut tokens = self.tokens();
        while let Some(token) = tokens.next() {
            if token == "-f" {
                return tokens.next();
            }
        }
        None
    }
}

impl fmt::Display for ConversionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Splits `tempo` into `atempo` stage factors.
///
/// Factors below 0.5 become a run of 0.5 stages followed by one residual
/// factor of at least 0.5; the product of the stages equals `tempo`.
pub fn tempo_chain(tempo: f64) -> Vec<f64> {
    if tempo >= MIN_TEMPO_STAGE || tempo <= 0.0 || tempo.is_nan() {
        return vec![tempo];
    }
    let mut stages = vec![MIN_TEMPO_STAGE];
    let mut remaining = tempo;
    while remaining < MIN_TEMPO_STAGE {
        remaining /= MIN_TEMPO_STAGE;
        if remaining >= MIN_TEMPO_STAGE {
            stages.push(remaining);
            break;
        }
        stages.push(MIN_TEMPO_STAGE);
    }
    stages
}

/// Appends `atempo` stages for `tempo` to an existing `-af` chain, or starts one.
pub fn append_tempo_filters(args: Option<String>, tempo: f64) -> String {
    let mut args = args;
    for stage in tempo_chain(tempo) {
        args = Some(match args {
            None => format!("-af atempo={}", stage),
            Some(existing) => format!("{},atempo={}", existing, stage),
        });
    }
    args.unwrap_or_default()
}

/// Resolves a user-facing conversion preset into transcoder arguments.
///
/// `alexa` and `volume N%` map to fixed argument strings, `custom` (or
/// nothing) means no conversion, and anything else is used verbatim.
pub fn parse_conversion_preset(raw: &str) -> Option<ConversionSpec> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("custom") {
        return None;
    }
    if raw.eq_ignore_ascii_case("alexa") {
        return Some(ConversionSpec::new(ALEXA_CONVERSION_ARGS));
    }
    let parts: Vec<&str> = raw.split(' ').collect();
    if parts.len() == 2 && parts[0].eq_ignore_ascii_case("volume") {
        match parts[1].replace('%', "").parse::<f64>() {
            Ok(percent) => {
                let factor = percent / 100.0;
                return Some(ConversionSpec::new(
                    VOLUME_CONVERSION_ARGS.replace('X', &factor.to_string()),
                ));
            }
            Err(e) => warn!(target: LOG_TARGET, "Error parsing audio conversion string '{}': {}", raw, e),
        }
    }
    Some(ConversionSpec::new(raw))
}

/// Where a conversion writes, and whether the result then replaces the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub output: PathBuf,
    pub replaces_input: bool,
}

/// Computes the output path for converting `input` with `spec`.
///
/// A `-f <ext>` request swaps the extension. Otherwise, or when that would
/// overwrite the input, a `_converted` suffix is used and the result is
/// later renamed back over the input.
pub fn plan_output(input: &Path, spec: &ConversionSpec) -> OutputPlan {
    if let Some(format) = spec.output_format() {
        let output = input.with_extension(format);
        if output != input {
            return OutputPlan {
                output,
                replaces_input: false,
            };
        }
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, CONVERTED_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, CONVERTED_SUFFIX),
    };
    OutputPlan {
        output: input.with_file_name(file_name),
        replaces_input: true,
    }
}

/// Runs the external transcoder over scratch files.
#[derive(Debug, Clone)]
pub struct Transcoder {
    binary: String,
    scratch: Arc<ScratchDir>,
}

impl Transcoder {
    pub fn new(binary: impl Into<String>, scratch: Arc<ScratchDir>) -> Self {
        Self {
            binary: binary.into(),
            scratch,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn scratch(&self) -> &Arc<ScratchDir> {
        &self.scratch
    }

    /// `-i <input> <spec tokens...> <output>`
    pub fn arguments(input: &Path, spec: &ConversionSpec, output: &Path) -> Vec<String> {
        let mut args = vec!["-i".to_string(), input.display().to_string()];
        args.extend(spec.tokens().map(str::to_string));
        args.push(output.display().to_string());
        args
    }

    /// Converts the file at `input` and returns the path of the result.
    ///
    /// On failure any partial output is deleted; `input` itself is left alone.
    #[instrument(skip_all, fields(input = %input.display(), spec = %spec))]
    pub async fn convert_file(&self, input: &Path, spec: &ConversionSpec) -> Result<PathBuf, TranscodeError> {
        if !input.exists() {
            warn!(
                target: LOG_TARGET,
                "Unable to perform conversion: source file not found: {}",
                input.display()
            );
            return Err(TranscodeError::SourceNotFound {
                path: input.to_path_buf(),
            });
        }

        let plan = plan_output(input, spec);
        self.scratch.remove(&plan.output).await;

        let args = Self::arguments(input, spec, &plan.output);
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!(target: LOG_TARGET, "Converting audio: \"{}\"", command);

        let output = match Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
        {
            Ok(output) => output,
            Err(source) => {
                error!(target: LOG_TARGET, "Unable to start transcoder \"{}\": {}", command, source);
                self.scratch.remove(&plan.output).await;
                return Err(TranscodeError::Spawn { command, source });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(
                target: LOG_TARGET,
                "Conversion failed. Arguments: \"{}\". Exit code: {:?}. Error output:\n{}",
                command,
                output.status.code(),
                stderr
            );
            self.scratch.remove(&plan.output).await;
            return Err(TranscodeError::Failed {
                command,
                code: output.status.code(),
                stderr,
            });
        }

        if plan.replaces_input {
            if let Err(source) = tokio::fs::rename(&plan.output, input).await {
                error!(
                    target: LOG_TARGET,
                    "Error renaming {} to {}: {}. Command: \"{}\"",
                    plan.output.display(),
                    input.display(),
                    source,
                    command
                );
                self.scratch.remove(&plan.output).await;
                return Err(TranscodeError::Rename {
                    from: plan.output,
                    to: input.to_path_buf(),
                    source,
                });
            }
            return Ok(input.to_path_buf());
        }

        Ok(plan.output)
    }

    /// Converts a finished output file, leaving one file behind.
    ///
    /// When the result lands at a new path the original is deleted. On
    /// failure the original path comes back unchanged.
    pub async fn convert_output(&self, input: &Path, spec: &ConversionSpec) -> PathBuf {
        match self.convert_file(input, spec).await {
            Ok(converted) => {
                if converted != input {
                    self.scratch.remove(input).await;
                }
                converted
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Unable to convert {}: {}", input.display(), e);
                input.to_path_buf()
            }
        }
    }

    /// Runs `spec` over an in-memory buffer.
    ///
    /// Never fails: if any step goes wrong the original buffer comes back
    /// with the reason attached as a diagnostic.
    #[instrument(skip_all, fields(spec = %spec, frames = buffer.frames()))]
    pub async fn convert(&self, buffer: AudioBuffer, spec: &ConversionSpec) -> Outcome<AudioBuffer, TranscodeError> {
        let source = match self.scratch.save_wav(&buffer).await {
            Ok(path) => path,
            Err(e) => {
                let path = self.scratch.path().to_path_buf();
                error!(target: LOG_TARGET, "Unable to store audio in {}: {}", path.display(), e);
                return Outcome::degraded(buffer, TranscodeError::Persist { path, source: e });
            }
        };

        let result = match self.convert_file(&source, spec).await {
            Ok(converted) => {
                let loaded = self.scratch.load(&converted).await;
                if converted != source {
                    self.scratch.remove(&converted).await;
                }
                loaded.map_err(|e| TranscodeError::Load {
                    path: converted,
                    source: e,
                })
            }
            Err(e) => Err(e),
        };
        self.scratch.remove(&source).await;

        match result {
            Ok(converted) => Outcome::clean(converted),
            Err(e) => {
                warn!(target: LOG_TARGET, "Using unmodified audio: {}", e);
                Outcome::degraded(buffer, e)
            }
        }
    }

    /// Changes playback speed to `speed` percent of the original.
    pub async fn change_speed(
        &self,
        buffer: Option<AudioBuffer>,
        speed: f64,
    ) -> Outcome<Option<AudioBuffer>, TranscodeError> {
        let Some(buffer) = buffer else {
            warn!(target: LOG_TARGET, "Cannot change audio playback speed. No audio available");
            return Outcome::degraded(None, TranscodeError::MissingAudio);
        };
        if speed == 100.0 {
            return Outcome::clean(Some(buffer));
        }
        if !(1.0..=500.0).contains(&speed) {
            warn!(target: LOG_TARGET, "Audio playback speed values must be between 1% and 500%, got {}%", speed);
            return Outcome::degraded(Some(buffer), TranscodeError::SpeedOutOfRange(speed));
        }
        debug!(target: LOG_TARGET, "Changing playback speed to {}% of original", speed);
        self.convert(buffer, &ConversionSpec::speed(speed)).await.map(Some)
    }

    /// Shifts the pitch by `semitones` while keeping the duration.
    pub async fn change_pitch(
        &self,
        buffer: Option<AudioBuffer>,
        semitones: f64,
    ) -> Outcome<Option<AudioBuffer>, TranscodeError> {
        let Some(buffer) = buffer else {
            warn!(target: LOG_TARGET, "Cannot change audio pitch. No audio available");
            return Outcome::degraded(None, TranscodeError::MissingAudio);
        };
        if semitones == 0.0 {
            return Outcome::clean(Some(buffer));
        }
        debug!(
            target: LOG_TARGET,
            "Changing pitch by {} semitone{}",
            semitones,
            if semitones == 1.0 { "" } else { "s" }
        );
        let spec = ConversionSpec::pitch(semitones, buffer.sample_rate());
        self.convert(buffer, &spec).await.map(Some)
    }
}

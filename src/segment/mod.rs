//! Timeline segments and the message parser that produces them.

mod parser;
#[cfg(test)]
mod tests;

pub use parser::*;

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// The three kinds of timeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Chime,
    Tts,
    Delay,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Chime => "chime",
            SegmentKind::Tts => "tts",
            SegmentKind::Delay => "delay",
        }
    }
}

/// The single payload a segment carries, tied to its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentPayload {
    Chime { path: String },
    Tts { message: String },
    Delay { length_ms: f64 },
}

/// One item of the audio timeline.
///
/// Segments are produced once per request by [`parse_message`] and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub payload: SegmentPayload,
    /// Requested repetitions. Segments returned by the parser are already
    /// expanded and carry 1.
    pub repeat_count: u32,
    /// Playback speed in percent; `None` means 100.
    pub speed: Option<f64>,
    /// Pitch shift in semitones; `None` means 0.
    pub pitch: Option<f64>,
    /// Overrides the global offset for the combine that appends this segment.
    pub offset_ms: Option<f64>,
    /// Remaining scalar keys, handed to the TTS renderer untouched.
    pub options: BTreeMap<String, String>,
}

impl Segment {
    fn with_payload(payload: SegmentPayload) -> Self {
        Self {
            payload,
            repeat_count: 1,
            speed: None,
            pitch: None,
            offset_ms: None,
            options: BTreeMap::new(),
        }
    }

    pub fn chime(path: impl Into<String>) -> Self {
        Self::with_payload(SegmentPayload::Chime { path: path.into() })
    }

    pub fn tts(message: impl Into<String>) -> Self {
        Self::with_payload(SegmentPayload::Tts {
            message: message.into(),
        })
    }

    pub fn delay(length_ms: f64) -> Self {
        Self::with_payload(SegmentPayload::Delay { length_ms })
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn kind(&self) -> SegmentKind {
        match self.payload {
            SegmentPayload::Chime { .. } => SegmentKind::Chime,
            SegmentPayload::Tts { .. } => SegmentKind::Tts,
            SegmentPayload::Delay { .. } => SegmentKind::Delay,
        }
    }

    pub fn effective_speed(&self) -> f64 {
        self.speed.unwrap_or(100.0)
    }

    pub fn effective_pitch(&self) -> f64 {
        self.pitch.unwrap_or(0.0)
    }

    /// Long-form mapping (`type: ...`) for this segment, suitable for re-parsing.
    pub fn to_long_form(&self) -> Value {
        let mut map = Mapping::new();
        map.insert("type".into(), self.kind().as_str().into());
        match &self.payload {
            SegmentPayload::Chime { path } => {
                map.insert("path".into(), path.as_str().into());
            }
            SegmentPayload::Tts { message } => {
                map.insert("message".into(), message.as_str().into());
            }
            SegmentPayload::Delay { length_ms } => {
                map.insert("length".into(), (*length_ms).into());
            }
        }
        if self.repeat_count > 1 {
            map.insert("repeat".into(), u64::from(self.repeat_count).into());
        }
        if let Some(speed) = self.speed {
            map.insert("tts_speed".into(), speed.into());
        }
        if let Some(pitch) = self.pitch {
            map.insert("tts_pitch".into(), pitch.into());
        }
        if let Some(offset) = self.offset_ms {
            map.insert("offset".into(), offset.into());
        }
        for (key, value) in &self.options {
            map.insert(key.as_str().into(), value.as_str().into());
        }
        Value::Mapping(map)
    }
}

/// Serialises segments as a long-form YAML list.
pub fn segments_to_yaml(segments: &[Segment]) -> Result<String, serde_yaml::Error> {
    let list = Value::Sequence(segments.iter().map(Segment::to_long_form).collect());
    serde_yaml::to_string(&list)
}

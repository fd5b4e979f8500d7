use super::{Segment, SegmentPayload};
use crate::outcome::Outcome;
use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const LOG_TARGET: &str = "r_chimetts::segment::parser";

/// Stands in for an escaped `\'` while the message goes through the YAML decoder.
pub const QUOTE_CHAR_SUBSTITUTE: &str = "_quote_char_";

/// Keys whose presence marks a message as a structured segment list.
const STRUCTURE_KEYS: [&str; 4] = ["type", "tts", "chime", "delay"];

/// Short-form keys, in the order they are checked.
const SHORT_FORM_KEYS: [&str; 3] = ["chime", "tts", "delay"];

/// Keys consumed by the parser itself; everything else lands in `Segment::options`.
const RESERVED_KEYS: [&str; 14] = [
    "type", "chime", "tts", "delay", "path", "message", "length", "repeat", "speed",
    "tts_speed", "pitch", "tts_pitch", "offset", "options",
];

/// Key holding a nested map of extra options for the segment.
const OPTIONS_KEY: &str = "options";

/// Upper bound for `repeat`; larger counts are reduced to this.
pub const MAX_REPEAT: u32 = 100;

/// Why a structured message was rejected and replaced by a single TTS segment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseIssue {
    #[error("message YAML could not be decoded: {0}")]
    InvalidYaml(String),
    #[error("message YAML is not a list of segments")]
    NotAList,
    #[error("segment {index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

/// Parses a raw message into an ordered list of segments.
///
/// Never fails: a message that looks structured but does not decode into a
/// valid segment list is spoken verbatim as one TTS segment, and the reason is
/// reported as a diagnostic.
pub fn parse_message(raw: &str) -> Outcome<Vec<Segment>, ParseIssue> {
    let message = remove_niqqud(raw);
    if message.is_empty() || message == "None" {
        return Outcome::clean(Vec::new());
    }

    let mut outcome: Outcome<(), ParseIssue> = Outcome::clean(());
    let mut segments = Vec::new();

    if looks_structured(&message) {
        match decode_segment_list(&message) {
            Ok(decoded) => segments = decoded,
            Err(issue) => {
                debug!(target: LOG_TARGET, "Treating message as plain text: {}", issue);
                outcome.push_diagnostic(issue);
            }
        }
    }

    if segments.is_empty() {
        segments.push(Segment::tts(message.clone()));
    }

    let mut expanded = Vec::with_capacity(segments.len());
    for segment in segments {
        let copies = segment.repeat_count.max(1);
        let mut single = segment;
        single.repeat_count = 1;
        for _ in 0..copies {
            expanded.push(single.clone());
        }
    }

    debug!(target: LOG_TARGET, "Parsed message into {} segment(s)", expanded.len());
    outcome.map(|_| expanded)
}

/// Removes Hebrew niqqud points (U+0591..=U+05C7), which TTS engines mispronounce.
pub fn remove_niqqud(text: &str) -> String {
    text.chars()
        .filter(|c| !('\u{0591}'..='\u{05C7}').contains(c))
        .collect()
}

fn looks_structured(message: &str) -> bool {
    let message = message.to_lowercase();
    STRUCTURE_KEYS.iter().any(|key| {
        message.contains(&format!("{key}:"))
            || message.contains(&format!("'{key}':"))
            || message.contains(&format!("\"{key}\":"))
    })
}

/// Protects user-escaped quotes (`\'`) from the YAML decoder.
fn escape_quotes(message: &str) -> String {
    message.replace("\\'", QUOTE_CHAR_SUBSTITUTE)
}

fn restore_quotes(text: &str) -> String {
    text.replace(QUOTE_CHAR_SUBSTITUTE, "'")
}

fn decode_segment_list(message: &str) -> Result<Vec<Segment>, ParseIssue> {
    let decoded: Value = serde_yaml::from_str(&escape_quotes(message)).map_err(|e| {
        if let Some(location) = e.location() {
            warn!(
                target: LOG_TARGET,
                "Message YAML parsing error at line {}, column {}: {}",
                location.line(),
                location.column(),
                e
            );
        }
        ParseIssue::InvalidYaml(e.to_string())
    })?;

    let Value::Sequence(entries) = decoded else {
        return Err(ParseIssue::NotAList);
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            segment_from_entry(entry).map_err(|reason| ParseIssue::InvalidEntry { index, reason })
        })
        .collect()
}

fn segment_from_entry(entry: Value) -> Result<Segment, String> {
    let Value::Mapping(mapping) = entry else {
        return Err("entry is not a map".to_string());
    };

    let mut fields: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in mapping {
        match scalar_to_string(&key) {
            Some(key) => {
                fields.insert(key.to_lowercase(), value);
            }
            None => return Err("entry has a non-scalar key".to_string()),
        }
    }

    let payload = match fields.get("type") {
        Some(kind) => long_form_payload(kind, &fields)?,
        None => short_form_payload(&fields)?,
    };

    let mut segment = Segment::with_payload(payload);

    segment.repeat_count = match fields.get("repeat").and_then(|r| r.as_i64()) {
        Some(r) if r > i64::from(MAX_REPEAT) => {
            warn!(target: LOG_TARGET, "Segment repeat count {} reduced to {}", r, MAX_REPEAT);
            MAX_REPEAT
        }
        Some(r) if r >= 1 => r as u32,
        _ => 1,
    };

    segment.speed = aliased_number(&fields, "speed", "tts_speed");
    segment.pitch = aliased_number(&fields, "pitch", "tts_pitch");
    segment.offset_ms = fields.get("offset").and_then(number_from);

    match fields.get(OPTIONS_KEY) {
        Some(Value::Mapping(nested)) => {
            for (key, value) in nested {
                match (scalar_to_string(key), scalar_to_string(value)) {
                    (Some(key), Some(text)) => {
                        segment.options.insert(key.to_lowercase(), text);
                    }
                    _ => debug!(target: LOG_TARGET, "Ignoring non-scalar entry in segment options"),
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => warn!(target: LOG_TARGET, "Segment '{}' must be a map, ignoring it", OPTIONS_KEY),
    }

    // Top-level keys win over the same key inside `options`.
    for (key, value) in &fields {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        match scalar_to_string(value) {
            Some(text) => {
                segment.options.insert(key.clone(), text);
            }
            None => debug!(target: LOG_TARGET, "Ignoring non-scalar segment option '{}'", key),
        }
    }

    Ok(segment)
}

fn long_form_payload(kind: &Value, fields: &BTreeMap<String, Value>) -> Result<SegmentPayload, String> {
    let kind = scalar_to_string(kind)
        .ok_or_else(|| "'type' must be a string".to_string())?
        .to_lowercase();
    match kind.as_str() {
        "chime" => Ok(SegmentPayload::Chime {
            path: text_field(fields, "path")?,
        }),
        "tts" => Ok(SegmentPayload::Tts {
            message: text_field(fields, "message")?,
        }),
        "delay" => Ok(SegmentPayload::Delay {
            length_ms: length_field(fields, "length")?,
        }),
        other => Err(format!("unknown segment type '{other}'")),
    }
}

fn short_form_payload(fields: &BTreeMap<String, Value>) -> Result<SegmentPayload, String> {
    let present: Vec<&str> = SHORT_FORM_KEYS
        .iter()
        .copied()
        .filter(|key| fields.contains_key(*key))
        .collect();

    match present.as_slice() {
        ["chime"] => Ok(SegmentPayload::Chime {
            path: text_field(fields, "chime")?,
        }),
        ["tts"] => Ok(SegmentPayload::Tts {
            message: text_field(fields, "tts")?,
        }),
        ["delay"] => Ok(SegmentPayload::Delay {
            length_ms: length_field(fields, "delay")?,
        }),
        [] => Err("entry has no 'type', 'chime', 'tts' or 'delay' key".to_string()),
        _ => Err(format!("entry mixes short-form keys: {}", present.join(", "))),
    }
}

fn text_field(fields: &BTreeMap<String, Value>, key: &str) -> Result<String, String> {
    fields
        .get(key)
        .and_then(scalar_to_string)
        .map(|text| restore_quotes(&text))
        .ok_or_else(|| format!("'{key}' must be a string"))
}

fn length_field(fields: &BTreeMap<String, Value>, key: &str) -> Result<f64, String> {
    match fields.get(key).and_then(number_from) {
        Some(length) if length >= 0.0 => Ok(length),
        _ => Err(format!("'{key}' must be a non-negative number of milliseconds")),
    }
}

/// Reads `alias` (renamed to `canonical` when set to a non-zero value) or `canonical`.
fn aliased_number(fields: &BTreeMap<String, Value>, alias: &str, canonical: &str) -> Option<f64> {
    fields
        .get(alias)
        .and_then(number_from)
        .filter(|value| *value != 0.0)
        .or_else(|| fields.get(canonical).and_then(number_from))
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

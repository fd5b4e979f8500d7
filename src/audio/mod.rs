//! Audio buffers, decoding, external conversion and timeline assembly.

pub mod buffer;
pub mod decoder;
pub mod error;
pub mod resample;
pub mod scratch;
pub mod timeline;
pub mod transcoder;

pub use buffer::AudioBuffer;
pub use error::{AudioError, TranscodeError};
pub use scratch::ScratchDir;
pub use timeline::{combine, overlay, AssemblyIssue, RenderError, SegmentRenderer, TimelineEngine};
pub use transcoder::{parse_conversion_preset, ConversionSpec, Transcoder};

//! Playback orchestration: volume fades, state waits and the request sequence.

pub mod fade;
pub mod orchestrator;
pub mod sync_waiter;

pub use fade::{fade_steps, FadeTarget, VolumeFader};
pub use orchestrator::{PlaybackOptions, PlaybackOrchestrator, PlaybackReport};
pub use sync_waiter::SyncWaiter;

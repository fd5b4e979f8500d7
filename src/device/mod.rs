//! Remote playback devices: state model, platform families and the Home Assistant client.

pub mod api;
pub mod home_assistant;
pub mod models;
pub mod platform;
pub mod prober;

pub use api::{DeviceControl, DeviceError};
pub use home_assistant::{HomeAssistantClient, ServiceRequest};
pub use models::*;
pub use platform::PlatformFamily;
pub use prober::DeviceProber;

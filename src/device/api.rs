//! Remote device control seam.

use crate::device::models::DeviceState;
use crate::device::platform::PlatformFamily;
use async_trait::async_trait;
use thiserror::Error;

/// Error types for remote device operations
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Authentication error: {0}")]
    Authentication(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Service {service} failed for {entity_id}: {reason}")]
    ServiceCall {
        service: String,
        entity_id: String,
        reason: String,
    },
    #[error("Error: {0}")]
    Other(String),
}

/// Commands and state reads for networked media players.
///
/// Implementations report an unknown device from [`DeviceControl::get_state`]
/// as `Ok(None)`; every other failure is an error.
#[async_trait]
pub trait DeviceControl: Send + Sync {
    async fn get_state(&self, entity_id: &str) -> Result<Option<DeviceState>, DeviceError>;

    async fn turn_on(&self, entity_id: &str) -> Result<(), DeviceError>;

    async fn set_volume(&self, entity_id: &str, level: f64) -> Result<(), DeviceError>;

    /// Groups `members` (which include `primary`) under `primary`.
    async fn join(&self, primary: &str, members: &[String]) -> Result<(), DeviceError>;

    /// Plays `media_content_id` on devices that all belong to `family`.
    ///
    /// Implementations pick the dispatch path from `family`.
    async fn play_media(
        &self,
        family: PlatformFamily,
        entity_ids: &[String],
        media_content_id: &str,
        announce: bool,
    ) -> Result<(), DeviceError>;

    /// Integration name the device belongs to, when the registry knows it.
    fn platform(&self, _entity_id: &str) -> Option<String> {
        None
    }
}

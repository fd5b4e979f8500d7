use crate::device::api::{DeviceControl, DeviceError};
use crate::device::models::{DeviceCapabilities, DeviceDescriptor, VolumeTarget};
use crate::device::platform::PlatformFamily;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const LOG_TARGET: &str = "r_chimetts::device::prober";

/// Builds [`DeviceDescriptor`]s from live device state.
#[derive(Clone)]
pub struct DeviceProber {
    control: Arc<dyn DeviceControl>,
}

impl DeviceProber {
    pub fn new(control: Arc<dyn DeviceControl>) -> Self {
        Self { control }
    }

    /// Classifies one device. A device the registry does not know yields `None`.
    #[instrument(skip(self, volume))]
    pub async fn classify(
        &self,
        entity_id: &str,
        volume: &VolumeTarget,
    ) -> Result<Option<DeviceDescriptor>, DeviceError> {
        let Some(state) = self.control.get_state(entity_id).await? else {
            warn!(target: LOG_TARGET, "Device {} not found, skipping", entity_id);
            return Ok(None);
        };

        let platform_name = self.control.platform(entity_id);
        let platform = platform_name
            .as_deref()
            .map(PlatformFamily::from_platform)
            .unwrap_or(PlatformFamily::Standard);

        let descriptor = DeviceDescriptor {
            id: entity_id.to_string(),
            platform,
            platform_name,
            capabilities: DeviceCapabilities::from_features(state.attributes.supported_features),
            initial_volume: state.volume_level(),
            target_volume: volume.resolve(entity_id),
            is_playing: state.is_playing(),
        };
        debug!(
            target: LOG_TARGET,
            "{}: platform {}, state {}, volume {:?} -> {:?}, {:?}",
            entity_id,
            descriptor.platform,
            state.state,
            descriptor.initial_volume,
            descriptor.target_volume,
            descriptor.capabilities
        );
        Ok(Some(descriptor))
    }

    /// Classifies every device, skipping unknown ones and logging lookup failures.
    pub async fn classify_all(&self, entity_ids: &[String], volume: &VolumeTarget) -> Vec<DeviceDescriptor> {
        let mut descriptors = Vec::with_capacity(entity_ids.len());
        for entity_id in entity_ids {
            match self.classify(entity_id, volume).await {
                Ok(Some(descriptor)) => descriptors.push(descriptor),
                Ok(None) => {}
                Err(e) => warn!(target: LOG_TARGET, "Unable to read state of {}: {}", entity_id, e),
            }
        }
        if descriptors.is_empty() && !entity_ids.is_empty() {
            warn!(target: LOG_TARGET, "No valid media players found");
        }
        descriptors
    }
}

//! Polls devices until their state satisfies a predicate.

use crate::device::api::DeviceControl;
use crate::device::models::DeviceState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const LOG_TARGET: &str = "r_chimetts::player::sync_waiter";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Budget for state transitions (turning on, starting playback).
pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_millis(3500);
/// Budget for a device to report a newly set volume.
pub const DEFAULT_VOLUME_TIMEOUT: Duration = Duration::from_secs(5);

/// Rounds a volume to the 3 decimal places devices reliably report back.
pub fn round_volume(level: f64) -> f64 {
    (level * 1000.0).round() / 1000.0
}

#[derive(Clone)]
pub struct SyncWaiter {
    control: Arc<dyn DeviceControl>,
    poll_interval: Duration,
}

impl SyncWaiter {
    pub fn new(control: Arc<dyn DeviceControl>, poll_interval: Duration) -> Self {
        Self {
            control,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits until every device satisfies `predicate` or `timeout` runs out.
    ///
    /// Returns `false` straight away when `entity_ids` is empty or names an
    /// unknown device. Each round re-checks only the devices still waiting
    /// and spends one poll interval of the budget; the waiter sleeps only
    /// while devices are pending and budget is left.
    pub async fn wait_until<F>(&self, entity_ids: &[String], predicate: F, timeout: Duration) -> bool
    where
        F: Fn(&DeviceState) -> bool + Send + Sync,
    {
        if entity_ids.is_empty() {
            return false;
        }
        for entity_id in entity_ids {
            match self.control.get_state(entity_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(target: LOG_TARGET, "Invalid entity_id: {}", entity_id);
                    return false;
                }
                Err(e) => {
                    warn!(target: LOG_TARGET, "Unable to read state of {}: {}", entity_id, e);
                    return false;
                }
            }
        }

        let mut waiting: Vec<&String> = entity_ids.iter().collect();
        let mut remaining = timeout;
        while !waiting.is_empty() && !remaining.is_zero() {
            let mut pending = Vec::with_capacity(waiting.len());
            for entity_id in waiting {
                match self.control.get_state(entity_id).await {
                    Ok(Some(state)) if predicate(&state) => {
                        debug!(target: LOG_TARGET, "   ✔ {}", entity_id);
                    }
                    _ => pending.push(entity_id),
                }
            }
            waiting = pending;
            remaining = remaining.saturating_sub(self.poll_interval);

            if !waiting.is_empty() && !remaining.is_zero() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        for entity_id in &waiting {
            debug!(target: LOG_TARGET, "   𝘅 {} - Timed out", entity_id);
        }
        waiting.is_empty()
    }

    #[instrument(skip(self, entity_ids), fields(devices = entity_ids.len()))]
    pub async fn wait_for_state(&self, entity_ids: &[String], target_state: &str, timeout: Duration) -> bool {
        debug!(target: LOG_TARGET, " - Waiting until {} device(s) are {}...", entity_ids.len(), target_state);
        self.wait_until(entity_ids, |state| state.state == target_state, timeout)
            .await
    }

    #[instrument(skip(self, entity_ids), fields(devices = entity_ids.len()))]
    pub async fn wait_for_state_not(&self, entity_ids: &[String], target_state: &str, timeout: Duration) -> bool {
        debug!(target: LOG_TARGET, " - Waiting until {} device(s) aren't {}...", entity_ids.len(), target_state);
        self.wait_until(entity_ids, |state| state.state != target_state, timeout)
            .await
    }

    /// Waits until each device reports `target_volume` (compared to 3 decimal places).
    #[instrument(skip(self, entity_ids), fields(devices = entity_ids.len()))]
    pub async fn wait_for_volume(&self, entity_ids: &[String], target_volume: f64, timeout: Duration) -> bool {
        let target = round_volume(target_volume);
        debug!(target: LOG_TARGET, " - Waiting until {} device(s) have volume {}...", entity_ids.len(), target);
        self.wait_until(
            entity_ids,
            |state| round_volume(state.volume_level().unwrap_or(-1.0)) == target,
            timeout,
        )
        .await
    }
}

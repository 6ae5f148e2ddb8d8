// devices/selection.rs
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::DeviceRegistry;
use crate::{error::AppError, models::Device};

/// The one device that control commands are sent to.
pub struct SelectionState {
    registry: Arc<DeviceRegistry>,
    selected: Mutex<Option<Device>>,
}

impl SelectionState {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            selected: Mutex::new(None),
        }
    }

    /// Selects by address or name. On failure the previous selection stays.
    pub async fn select(&self, identifier: &str) -> Result<Device, AppError> {
        let mut selected = self.selected.lock().await;
        let device = self
            .registry
            .find(identifier)
            .await
            .ok_or_else(|| AppError::DeviceNotFound(identifier.to_string()))?;

        info!(name = %device.name, address = %device.address, "Device selected");
        *selected = Some(device.clone());
        Ok(device)
    }

    /// Returns the selection if its address is still in the registry, and
    /// clears it otherwise. The name is refreshed from the current snapshot.
    pub async fn current(&self) -> Option<Device> {
        let mut selected = self.selected.lock().await;
        let address = selected.as_ref()?.address.clone();

        match self.registry.find_by_address(&address).await {
            Some(device) => {
                *selected = Some(device.clone());
                Some(device)
            }
            None => {
                warn!(%address, "Selected device left the registry, clearing selection");
                *selected = None;
                None
            }
        }
    }

    pub async fn clear(&self) -> Option<Device> {
        self.selected.lock().await.take()
    }
}

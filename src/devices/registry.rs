// devices/registry.rs
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::store::RegistryStore;
use crate::models::Device;

/// The device list from the most recent successful scan.
///
/// The list is held as an immutable `Arc<[Device]>` and swapped as a whole, so
/// a reader holds either the previous snapshot or the new one, never a mix.
pub struct DeviceRegistry {
    snapshot: RwLock<Arc<[Device]>>,
    store: Option<Arc<dyn RegistryStore>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::from(Vec::new())),
            store: None,
        }
    }

    pub fn with_store(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::from(Vec::new())),
            store: Some(store),
        }
    }

    /// Seeds the snapshot from the store. Returns the number of devices loaded.
    pub async fn load(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        match store.load().await {
            Ok(devices) => {
                let devices: Arc<[Device]> = dedup_by_address(devices).into();
                let count = devices.len();
                *self.snapshot.write().await = devices;
                info!(count, "Loaded persisted devices");
                count
            }
            Err(e) => {
                warn!(error = %e, "Could not load persisted devices, starting empty");
                0
            }
        }
    }

    /// Swaps in a new snapshot. Entries repeating an earlier address are dropped.
    pub async fn replace(&self, devices: Vec<Device>) -> Arc<[Device]> {
        let next: Arc<[Device]> = dedup_by_address(devices).into();
        *self.snapshot.write().await = next.clone();

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&next).await {
                warn!(error = %e, "Could not persist device list");
            }
        }
        next
    }

    pub async fn list(&self) -> Arc<[Device]> {
        self.snapshot.read().await.clone()
    }

    /// Looks a device up by address, then by name.
    pub async fn find(&self, identifier: &str) -> Option<Device> {
        let snapshot = self.list().await;
        resolve(&snapshot, identifier).cloned()
    }

    pub async fn find_by_address(&self, address: &str) -> Option<Device> {
        self.list()
            .await
            .iter()
            .find(|d| d.address == address)
            .cloned()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Address is the identity key, so an address hit anywhere in the list beats
/// a name hit on a different entry. Among name hits the first listed wins.
fn resolve<'a>(devices: &'a [Device], identifier: &str) -> Option<&'a Device> {
    devices
        .iter()
        .find(|d| d.address == identifier)
        .or_else(|| devices.iter().find(|d| d.name == identifier))
}

fn dedup_by_address(devices: Vec<Device>) -> Vec<Device> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|d| seen.insert(d.address.clone()))
        .collect()
}

// discovery/mdns.rs
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent};
use tracing::{debug, warn};

use super::{DiscoveryBackend, DiscoveryError};
use crate::models::Device;

const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";
const BROWSE_POLL: Duration = Duration::from_millis(250);

/// In-process discovery by browsing the Cast mDNS service type.
pub struct MdnsScanner {
    window: Duration,
}

impl MdnsScanner {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

#[async_trait]
impl DiscoveryBackend for MdnsScanner {
    async fn scan(&self, timeout: Duration) -> Result<Vec<Device>, DiscoveryError> {
        // Leave headroom so the browse finishes before the caller gives up.
        let window = self.window.min(timeout / 2);
        tokio::task::spawn_blocking(move || browse(window))
            .await
            .map_err(|e| DiscoveryError::Failed(format!("mDNS browse task failed: {e}")))?
    }
}

fn browse(window: Duration) -> Result<Vec<Device>, DiscoveryError> {
    let mdns = ServiceDaemon::new()
        .map_err(|e| DiscoveryError::Failed(format!("failed to start mDNS daemon: {e}")))?;
    let receiver = match mdns.browse(CAST_SERVICE_TYPE) {
        Ok(receiver) => receiver,
        Err(e) => {
            let _ = mdns.shutdown();
            return Err(DiscoveryError::Failed(format!(
                "failed to browse {CAST_SERVICE_TYPE}: {e}"
            )));
        }
    };

    let deadline = Instant::now() + window;
    let mut by_address: HashMap<String, Device> = HashMap::new();
    while Instant::now() < deadline {
        let wait = deadline
            .saturating_duration_since(Instant::now())
            .min(BROWSE_POLL);
        let Ok(event) = receiver.recv_timeout(wait) else {
            continue;
        };
        if let ServiceEvent::ServiceResolved(service) = event {
            if let Some(device) = device_from_service(&service) {
                debug!(name = %device.name, address = %device.address, "Resolved cast receiver");
                by_address.entry(device.address.clone()).or_insert(device);
            }
        }
    }

    if let Err(e) = mdns.stop_browse(CAST_SERVICE_TYPE) {
        warn!(error = %e, "Failed to stop mDNS browse");
    }
    let _ = mdns.shutdown();

    let mut devices: Vec<Device> = by_address.into_values().collect();
    devices.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(devices)
}

fn device_from_service(service: &ResolvedService) -> Option<Device> {
    let mut addresses: Vec<_> = service.get_addresses_v4().iter().copied().collect();
    addresses.sort();
    let address = addresses.first()?.to_string();

    let name = service
        .get_property_val_str("fn")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| instance_name(service.get_fullname()));
    Some(Device::new(name, address))
}

/// `Den-TV-1234._googlecast._tcp.local.` -> `Den-TV-1234`
fn instance_name(fullname: &str) -> String {
    fullname
        .strip_suffix(CAST_SERVICE_TYPE)
        .unwrap_or(fullname)
        .trim_matches('.')
        .to_string()
}

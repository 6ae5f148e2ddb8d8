// metrics/mod.rs
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::events::{self, EventBus};

pub fn setup_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to setup metrics: {}", e))?;
    tracing::info!("Prometheus metrics on {}", addr);
    Ok(())
}

/// Turns session events into counters. Without an installed recorder the
/// macros are no-ops, so this is safe to call unconditionally.
pub fn record_events(bus: &EventBus) {
    bus.subscribe(events::SCAN_COMPLETED, |data| {
        metrics::counter!("castctl_scans_total", "outcome" => "success").increment(1);
        if let Some(count) = data.get("devices").and_then(|v| v.as_u64()) {
            metrics::gauge!("castctl_registry_devices").set(count as f64);
        }
    });
    bus.subscribe(events::SCAN_FAILED, |_| {
        metrics::counter!("castctl_scans_total", "outcome" => "failure").increment(1);
    });
    bus.subscribe(events::DEVICE_SELECTED, |_| {
        metrics::counter!("castctl_selections_total").increment(1);
    });
    bus.subscribe(events::COMMAND_FINISHED, |data| {
        let action = data["action"].as_str().unwrap_or("unknown").to_string();
        let outcome = data["outcome"].as_str().unwrap_or("unknown").to_string();
        metrics::counter!("castctl_commands_total", "action" => action, "outcome" => outcome)
            .increment(1);
    });
}

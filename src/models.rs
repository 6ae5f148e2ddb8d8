use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    commands::DeviceCommandExecutor,
    devices::{DeviceRegistry, SelectionState},
    discovery::DiscoveryCoordinator,
};

/// A cast receiver found on the network. `address` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    pub name: String,
    #[serde(alias = "ip_address")]
    pub address: String,
}

impl Device {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Playback status as reported by a receiver. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast_mode: Option<String>,
}

/// Whatever a control backend printed or returned for a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl RawOutput {
    pub fn empty() -> Self {
        RawOutput::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawOutput::Text(text) => text.trim().is_empty(),
            RawOutput::Structured(value) => value.is_null(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SelectDeviceRequest {
    /// Device name or address.
    #[validate(length(min = 1, max = 256))]
    pub device: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CastRequest {
    #[validate(length(min = 1, max = 4096))]
    pub url: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ControlRequest {
    /// One of play, pause, stop, volume, seek, rewind, forward, status.
    #[validate(length(min = 1, max = 32))]
    pub action: String,
    pub volume_level: Option<f64>,
    pub position: Option<f64>,
    pub seconds: Option<f64>,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SelectionResponse {
    pub message: String,
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandResponse {
    pub message: String,
    pub action: String,
    pub device: Device,
    #[schema(value_type = Object)]
    #[serde(skip_serializing_if = "RawOutput::is_empty")]
    pub output: RawOutput,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusReport {
    pub device: Device,
    pub status: DeviceStatus,
}

pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub selection: Arc<SelectionState>,
    pub discovery: DiscoveryCoordinator,
    pub executor: DeviceCommandExecutor,
}

impl AppState {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        discovery: DiscoveryCoordinator,
        executor: DeviceCommandExecutor,
    ) -> Self {
        Self {
            selection: executor.selection(),
            registry,
            discovery,
            executor,
        }
    }
}

// commands/mod.rs
mod cast_lib;
mod catt;

pub use cast_lib::CastLibBackend;
pub use catt::CattBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::time;
use tracing::{error, info};

use crate::{
    devices::SelectionState,
    error::AppError,
    events::{self, EventBus},
    models::{ControlRequest, Device, DeviceStatus, RawOutput},
    status, utils,
};

/// A control operation for the selected device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeviceCommand {
    Cast { url: String },
    Play,
    Pause,
    Stop,
    Seek { position: f64 },
    #[serde(rename = "volume")]
    SetVolume { level: f64 },
    Rewind { seconds: f64 },
    Forward { seconds: f64 },
    Status,
}

impl DeviceCommand {
    pub fn action(&self) -> &'static str {
        match self {
            DeviceCommand::Cast { .. } => "cast",
            DeviceCommand::Play => "play",
            DeviceCommand::Pause => "pause",
            DeviceCommand::Stop => "stop",
            DeviceCommand::Seek { .. } => "seek",
            DeviceCommand::SetVolume { .. } => "volume",
            DeviceCommand::Rewind { .. } => "rewind",
            DeviceCommand::Forward { .. } => "forward",
            DeviceCommand::Status => "status",
        }
    }

    /// Rejects bad caller input before anything touches the network. The
    /// returned command carries exactly the values that were checked.
    pub fn validated(self) -> Result<Self, AppError> {
        match self {
            DeviceCommand::Cast { url } => {
                let url = url.trim();
                utils::validate_media_url(url)?;
                Ok(DeviceCommand::Cast {
                    url: url.to_string(),
                })
            }
            DeviceCommand::SetVolume { level } => {
                if level.is_finite() && (0.0..=1.0).contains(&level) {
                    Ok(self)
                } else {
                    Err(AppError::InvalidParameter(format!(
                        "volume level must be between 0.0 and 1.0, got {level}"
                    )))
                }
            }
            DeviceCommand::Seek { position: value }
            | DeviceCommand::Rewind { seconds: value }
            | DeviceCommand::Forward { seconds: value } => {
                if value.is_finite() && value >= 0.0 {
                    Ok(self)
                } else {
                    Err(AppError::InvalidParameter(format!(
                        "{} needs a non-negative number of seconds, got {value}",
                        self.action()
                    )))
                }
            }
            DeviceCommand::Play
            | DeviceCommand::Pause
            | DeviceCommand::Stop
            | DeviceCommand::Status => Ok(self),
        }
    }
}

#[derive(Error, Debug)]
pub enum ControlError {
    /// Diagnostic text exactly as the device tool reported it.
    #[error("{0}")]
    Failed(String),
    #[error("control call timed out")]
    Timeout,
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("cast protocol error: {0}")]
    Protocol(String),
}

/// Performs one control call against a device address.
#[async_trait]
pub trait ControlBackend: Send + Sync {
    async fn invoke(
        &self,
        address: &str,
        command: &DeviceCommand,
        timeout: Duration,
    ) -> Result<RawOutput, ControlError>;
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub device: Device,
    pub command: DeviceCommand,
    pub output: RawOutput,
}

/// Selection succeeded; the volume lookup that follows may not have.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub device: Device,
    pub volume: Option<f64>,
    pub volume_error: Option<String>,
}

/// Sends validated commands to the current selection, one backend call each,
/// bounded by a timeout and never retried.
#[derive(Clone)]
pub struct DeviceCommandExecutor {
    selection: Arc<SelectionState>,
    backend: Arc<dyn ControlBackend>,
    events: Arc<EventBus>,
    timeout: Duration,
}

impl DeviceCommandExecutor {
    pub fn new(
        selection: Arc<SelectionState>,
        backend: Arc<dyn ControlBackend>,
        events: Arc<EventBus>,
        timeout: Duration,
    ) -> Self {
        Self {
            selection,
            backend,
            events,
            timeout,
        }
    }

    pub fn selection(&self) -> Arc<SelectionState> {
        self.selection.clone()
    }

    pub async fn execute(&self, command: DeviceCommand) -> Result<CommandOutcome, AppError> {
        let command = command.validated()?;
        let device = self
            .selection
            .current()
            .await
            .ok_or(AppError::NoDeviceSelected)?;

        let action = command.action();
        info!(address = %device.address, action, "Sending control command");

        let call = self.backend.invoke(&device.address, &command, self.timeout);
        let result = match time::timeout(self.timeout, call).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(ControlError::Timeout)) | Err(_) => Err(AppError::Timeout {
                action,
                timeout: self.timeout,
            }),
            Ok(Err(e)) => Err(AppError::ExternalFailure(e.to_string())),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.events.publish(
            events::COMMAND_FINISHED,
            json!({ "action": action, "outcome": outcome }),
        );

        match result {
            Ok(output) => Ok(CommandOutcome {
                device,
                command,
                output,
            }),
            Err(e) => {
                error!(address = %device.address, action, error = %e, "Control command failed");
                Err(e)
            }
        }
    }

    pub async fn status(&self) -> Result<(Device, DeviceStatus), AppError> {
        let outcome = self.execute(DeviceCommand::Status).await?;
        Ok((outcome.device, status::parse(&outcome.output)))
    }

    /// Selects a device and reads its volume. A failed volume read does not
    /// undo the selection; it is reported next to it.
    pub async fn select_with_volume(&self, identifier: &str) -> Result<SelectionOutcome, AppError> {
        let device = self.selection.select(identifier).await?;
        self.events.publish(
            events::DEVICE_SELECTED,
            json!({ "name": device.name, "address": device.address }),
        );

        let (volume, volume_error) = match self.status().await {
            Ok((_, status)) => match status.volume_level {
                Some(level) => (Some(level), None),
                None => (None, Some("device did not report a volume level".to_string())),
            },
            Err(e) => (None, Some(e.to_string())),
        };
        Ok(SelectionOutcome {
            device,
            volume,
            volume_error,
        })
    }
}

/// Turns a named control action into a command.
pub trait CommandFactory: Sync {
    fn action(&self) -> &'static str;
    fn create(&self, request: &ControlRequest) -> Result<DeviceCommand, AppError>;
}

inventory::collect!(&'static dyn CommandFactory);

pub struct ActionFactory {
    action: &'static str,
    build: fn(&ControlRequest) -> Result<DeviceCommand, AppError>,
}

impl CommandFactory for ActionFactory {
    fn action(&self) -> &'static str {
        self.action
    }

    fn create(&self, request: &ControlRequest) -> Result<DeviceCommand, AppError> {
        (self.build)(request)
    }
}

pub fn command_from_request(request: &ControlRequest) -> Result<DeviceCommand, AppError> {
    let action = request.action.trim();
    inventory::iter::<&'static dyn CommandFactory>
        .into_iter()
        .find(|factory| factory.action() == action)
        .ok_or_else(|| AppError::UnsupportedCommand(action.to_string()))?
        .create(request)
}

fn required(value: Option<f64>, field: &str) -> Result<f64, AppError> {
    value.ok_or_else(|| AppError::InvalidParameter(format!("{field} is required")))
}

const DEFAULT_SKIP_SECS: f64 = 30.0;

static CAST: ActionFactory = ActionFactory {
    action: "cast",
    build: |request| {
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| AppError::InvalidUrl("url is required".into()))?;
        Ok(DeviceCommand::Cast {
            url: url.to_string(),
        })
    },
};
static PLAY: ActionFactory = ActionFactory {
    action: "play",
    build: |_| Ok(DeviceCommand::Play),
};
static PAUSE: ActionFactory = ActionFactory {
    action: "pause",
    build: |_| Ok(DeviceCommand::Pause),
};
static STOP: ActionFactory = ActionFactory {
    action: "stop",
    build: |_| Ok(DeviceCommand::Stop),
};
static STATUS: ActionFactory = ActionFactory {
    action: "status",
    build: |_| Ok(DeviceCommand::Status),
};
static VOLUME: ActionFactory = ActionFactory {
    action: "volume",
    build: |request| {
        Ok(DeviceCommand::SetVolume {
            level: required(request.volume_level, "volume_level")?,
        })
    },
};
static SEEK: ActionFactory = ActionFactory {
    action: "seek",
    build: |request| {
        Ok(DeviceCommand::Seek {
            position: required(request.position, "position")?,
        })
    },
};
static REWIND: ActionFactory = ActionFactory {
    action: "rewind",
    build: |request| {
        Ok(DeviceCommand::Rewind {
            seconds: request.seconds.unwrap_or(DEFAULT_SKIP_SECS),
        })
    },
};
static FORWARD: ActionFactory = ActionFactory {
    action: "forward",
    build: |request| {
        Ok(DeviceCommand::Forward {
            seconds: request.seconds.unwrap_or(DEFAULT_SKIP_SECS),
        })
    },
};

inventory::submit! { &CAST as &'static dyn CommandFactory }
inventory::submit! { &PLAY as &'static dyn CommandFactory }
inventory::submit! { &PAUSE as &'static dyn CommandFactory }
inventory::submit! { &STOP as &'static dyn CommandFactory }
inventory::submit! { &STATUS as &'static dyn CommandFactory }
inventory::submit! { &VOLUME as &'static dyn CommandFactory }
inventory::submit! { &SEEK as &'static dyn CommandFactory }
inventory::submit! { &REWIND as &'static dyn CommandFactory }
inventory::submit! { &FORWARD as &'static dyn CommandFactory }

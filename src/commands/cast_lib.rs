// commands/cast_lib.rs
use std::time::Duration;

use async_trait::async_trait;
use rust_cast::{
    CastDevice,
    channels::{
        media::{Media, StatusEntry, StreamType},
        receiver::CastDeviceApp,
    },
};
use serde_json::{Map, Value, json};
use tokio::time;

use super::{ControlBackend, ControlError, DeviceCommand};
use crate::models::RawOutput;

const RECEIVER_DESTINATION: &str = "receiver-0";

/// Talks Cast v2 to the receiver directly, without an external tool.
///
/// `rust_cast` is synchronous, so every command opens its own connection on
/// the blocking pool.
pub struct CastLibBackend {
    port: u16,
}

impl CastLibBackend {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl ControlBackend for CastLibBackend {
    async fn invoke(
        &self,
        address: &str,
        command: &DeviceCommand,
        timeout: Duration,
    ) -> Result<RawOutput, ControlError> {
        let address = address.to_string();
        let command = command.clone();
        let port = self.port;
        let task = tokio::task::spawn_blocking(move || run_blocking(&address, port, &command));

        time::timeout(timeout, task)
            .await
            .map_err(|_| ControlError::Timeout)?
            .map_err(|e| ControlError::Protocol(format!("cast task failed: {e}")))?
    }
}

fn protocol(context: &str) -> impl Fn(rust_cast::errors::Error) -> ControlError + '_ {
    move |e| ControlError::Protocol(format!("{context}: {e}"))
}

fn run_blocking(
    address: &str,
    port: u16,
    command: &DeviceCommand,
) -> Result<RawOutput, ControlError> {
    let device = CastDevice::connect_without_host_verification(address, port)
        .map_err(protocol("failed to connect"))?;
    device
        .connection
        .connect(RECEIVER_DESTINATION)
        .map_err(protocol("failed to open receiver channel"))?;

    match command {
        DeviceCommand::Cast { url } => {
            let app = device
                .receiver
                .launch_app(&CastDeviceApp::DefaultMediaReceiver)
                .map_err(protocol("failed to launch media receiver"))?;
            let transport_id = app.transport_id.clone();
            device
                .connection
                .connect(transport_id.clone())
                .map_err(protocol("failed to connect to media receiver"))?;

            let media = Media {
                content_id: url.clone(),
                content_type: content_type_for(url).to_string(),
                stream_type: StreamType::Buffered,
                duration: None,
                metadata: None,
            };
            device
                .media
                .load(transport_id.clone(), app.session_id.clone(), &media)
                .map_err(protocol("failed to load media"))?;

            Ok(RawOutput::Structured(json!({
                "content_id": url,
                "display_name": app.display_name,
            })))
        }
        DeviceCommand::SetVolume { level } => {
            device
                .receiver
                .set_volume(*level as f32)
                .map_err(protocol("failed to set volume"))?;
            Ok(RawOutput::Structured(json!({ "volume_level": level })))
        }
        DeviceCommand::Status => status_report(&device),
        DeviceCommand::Play
        | DeviceCommand::Pause
        | DeviceCommand::Stop
        | DeviceCommand::Seek { .. }
        | DeviceCommand::Rewind { .. }
        | DeviceCommand::Forward { .. } => {
            let (transport_id, entry) = active_media(&device)?;
            let session = entry.media_session_id;
            let current = entry.current_time.unwrap_or(0.0) as f64;

            let target = match command {
                DeviceCommand::Rewind { seconds } => Some((current - seconds).max(0.0)),
                DeviceCommand::Forward { seconds } => Some(current + seconds),
                DeviceCommand::Seek { position } => Some(*position),
                _ => None,
            };
            match (command, target) {
                (DeviceCommand::Play, _) => {
                    device.media.play(transport_id.clone(), session).map(drop)
                }
                (DeviceCommand::Pause, _) => {
                    device.media.pause(transport_id.clone(), session).map(drop)
                }
                (DeviceCommand::Stop, _) => {
                    device.media.stop(transport_id.clone(), session).map(drop)
                }
                (_, position) => device
                    .media
                    .seek(transport_id.clone(), session, position.map(|p| p as f32), None)
                    .map(drop),
            }
            .map_err(protocol("media command failed"))?;

            let mut report = Map::new();
            report.insert("action".into(), json!(command.action()));
            if let Some(position) = target {
                report.insert("current_time".into(), json!(position));
            }
            Ok(RawOutput::Structured(Value::Object(report)))
        }
    }
}

/// Finds the running app and its first media session.
fn active_media(device: &CastDevice<'_>) -> Result<(String, StatusEntry), ControlError> {
    let status = device
        .receiver
        .get_status()
        .map_err(protocol("failed to read receiver status"))?;
    let app = status
        .applications
        .first()
        .ok_or_else(|| ControlError::Failed("no application is running on the device".into()))?;
    let transport_id = app.transport_id.clone();
    device
        .connection
        .connect(transport_id.clone())
        .map_err(protocol("failed to connect to running application"))?;

    let media = device
        .media
        .get_status(transport_id.clone(), None)
        .map_err(protocol("failed to read media status"))?;
    let entry = media
        .entries
        .into_iter()
        .next()
        .ok_or_else(|| ControlError::Failed("no media session is active".into()))?;
    Ok((transport_id, entry))
}

fn status_report(device: &CastDevice<'_>) -> Result<RawOutput, ControlError> {
    let status = device
        .receiver
        .get_status()
        .map_err(protocol("failed to read receiver status"))?;

    let mut report = Map::new();
    if let Some(level) = status.volume.level {
        report.insert("volume_level".into(), json!(level));
    }
    if let Some(app) = status.applications.first() {
        report.insert("display_name".into(), json!(app.display_name));
        let transport_id = app.transport_id.clone();
        device
            .connection
            .connect(transport_id.clone())
            .map_err(protocol("failed to connect to running application"))?;
        let media = device
            .media
            .get_status(transport_id.clone(), None)
            .map_err(protocol("failed to read media status"))?;
        if let Some(entry) = media.entries.first() {
            merge_entry(&mut report, entry);
        }
    }
    Ok(RawOutput::Structured(Value::Object(report)))
}

fn merge_entry(report: &mut Map<String, Value>, entry: &StatusEntry) {
    report.insert(
        "state".into(),
        json!(format!("{:?}", entry.player_state).to_uppercase()),
    );
    if let Some(current_time) = entry.current_time {
        report.insert("current_time".into(), json!(current_time));
    }
    if let Some(media) = &entry.media {
        report.insert("content_id".into(), json!(media.content_id));
        if let Some(duration) = media.duration {
            report.insert("duration".into(), json!(duration));
        }
    }
}

fn content_type_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "m3u8" => "application/x-mpegURL",
        "mpd" => "application/dash+xml",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "video/mp4",
    }
}

// commands/catt.rs
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::{process::Command, time};
use tracing::debug;

use super::{ControlBackend, ControlError, DeviceCommand};
use crate::models::RawOutput;

/// Drives a receiver by running the `catt` CLI once per command.
pub struct CattBackend {
    program: String,
}

impl CattBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// `catt -d <address> <subcommand> [value]`
pub fn catt_args(address: &str, command: &DeviceCommand) -> Vec<String> {
    let mut args = vec!["-d".to_string(), address.to_string()];
    match command {
        DeviceCommand::Cast { url } => args.extend(["cast".to_string(), url.clone()]),
        DeviceCommand::Play => args.push("play".into()),
        DeviceCommand::Pause => args.push("pause".into()),
        DeviceCommand::Stop => args.push("stop".into()),
        DeviceCommand::Seek { position } => args.extend(["seek".to_string(), seconds(*position)]),
        // catt takes volume as a 0-100 percentage.
        DeviceCommand::SetVolume { level } => args.extend([
            "volume".to_string(),
            ((level * 100.0).round() as u8).to_string(),
        ]),
        DeviceCommand::Rewind { seconds: s } => args.extend(["rewind".to_string(), seconds(*s)]),
        DeviceCommand::Forward { seconds: s } => args.extend(["ffwd".to_string(), seconds(*s)]),
        // `info` prints the raw key: value status that the parser understands.
        DeviceCommand::Status => args.push("info".into()),
    }
    args
}

fn seconds(value: f64) -> String {
    (value.round() as u64).to_string()
}

#[async_trait]
impl ControlBackend for CattBackend {
    async fn invoke(
        &self,
        address: &str,
        command: &DeviceCommand,
        timeout: Duration,
    ) -> Result<RawOutput, ControlError> {
        let args = catt_args(address, command);
        debug!(program = %self.program, ?args, "Running catt");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = time::timeout(timeout, child)
            .await
            .map_err(|_| ControlError::Timeout)?
            .map_err(|source| ControlError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ControlError::Failed(failure_message(&output.stderr, || {
                format!("{} exited with {}", self.program, output.status)
            })));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(RawOutput::empty());
        }
        Ok(RawOutput::Text(stdout.into_owned()))
    }
}

/// stderr exactly as catt printed it, or `fallback` when it printed nothing.
fn failure_message(stderr: &[u8], fallback: impl FnOnce() -> String) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    if stderr.trim().is_empty() {
        fallback()
    } else {
        stderr.into_owned()
    }
}

// discovery/catt.rs
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{DiscoveryBackend, DiscoveryError};
use crate::models::Device;

/// Discovery through `catt scan`.
pub struct CattScanner {
    program: String,
}

impl CattScanner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DiscoveryBackend for CattScanner {
    async fn scan(&self, _timeout: Duration) -> Result<Vec<Device>, DiscoveryError> {
        // The caller bounds the scan; dropping the future kills the child.
        let output = Command::new(&self.program)
            .arg("scan")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiscoveryError::Failed(format!(
                "{} scan exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(output = %stdout, "catt scan output");
        Ok(parse_scan_output(&stdout))
    }
}

/// Reads `<ip> - <name> - <model>` lines. Anything else (headers, blank
/// lines, "No devices found") is ignored.
pub fn parse_scan_output(output: &str) -> Vec<Device> {
    output.lines().filter_map(parse_scan_line).collect()
}

fn parse_scan_line(line: &str) -> Option<Device> {
    let (address, rest) = line.trim().split_once(" - ")?;
    let address = address.trim();
    address.parse::<IpAddr>().ok()?;

    let (name, _model) = rest.split_once(" - ")?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Device::new(name, address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_catt_scan_listing() {
        let output = "Scanning Chromecasts...\n\
                      192.168.1.5 - Den TV - Google Inc. Chromecast\n\
                      192.168.1.9 - Kitchen - Google Inc. Google Home Mini\n";

        assert_eq!(
            parse_scan_output(output),
            vec![
                Device::new("Den TV", "192.168.1.5"),
                Device::new("Kitchen", "192.168.1.9"),
            ]
        );
    }

    #[rstest]
    #[case("No devices found")]
    #[case("")]
    #[case("192.168.1.5 - Den TV")]
    #[case("not-an-ip - Den TV - Chromecast")]
    #[case("192.168.1.5 -  - Chromecast")]
    fn skips_lines_that_are_not_devices(#[case] line: &str) {
        assert!(parse_scan_output(line).is_empty());
    }

    #[test]
    fn name_stops_at_first_separator() {
        let devices = parse_scan_output("  10.0.0.4 - Bedroom - Google - Chromecast Ultra ");
        assert_eq!(devices, vec![Device::new("Bedroom", "10.0.0.4")]);
    }

    #[tokio::test]
    async fn missing_binary_is_an_io_error() {
        let scanner = CattScanner::new("castctl-no-such-binary");
        let err = scanner.scan(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Io(_)));
    }
}

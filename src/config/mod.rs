// config/mod.rs
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, Source};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub discovery: DiscoverySettings,
    pub control: ControlSettings,
    pub persistence: PersistenceSettings,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub address: String,
    pub static_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryBackendKind {
    Catt,
    Mdns,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverySettings {
    pub backend: DiscoveryBackendKind,
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
    pub mdns_window_ms: u64,
}

impl DiscoverySettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn mdns_window(&self) -> Duration {
        Duration::from_millis(self.mdns_window_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlBackendKind {
    /// Run the `catt` CLI per command.
    Catt,
    /// Speak Cast v2 in-process.
    CastLib,
}

#[derive(Debug, Deserialize)]
pub struct ControlSettings {
    pub backend: ControlBackendKind,
    pub timeout_secs: u64,
    pub catt_path: String,
    pub cast_port: u16,
}

impl ControlSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct PersistenceSettings {
    pub enabled: bool,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// `config/config.toml` if present, then `APP_*` variables
    /// (`APP_DISCOVERY__COOLDOWN_SECS=30`).
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(File::with_name("config/config").required(false))
    }

    pub fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .set_default("server.address", "0.0.0.0:5000")?
            .set_default("server.static_dir", "static")?
            .set_default("discovery.backend", "catt")?
            .set_default("discovery.cooldown_secs", 10)?
            .set_default("discovery.timeout_secs", 10)?
            .set_default("discovery.mdns_window_ms", 3000)?
            .set_default("control.backend", "catt")?
            .set_default("control.timeout_secs", 10)?
            .set_default("control.catt_path", "catt")?
            .set_default("control.cast_port", 8009)?
            .set_default("persistence.enabled", false)?
            .set_default("persistence.path", "devices.json")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9000)?
            .add_source(source)
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_apply_without_a_file() {
        let missing = File::with_name("does/not/exist").required(false);

        let settings = Settings::from_source(missing).unwrap();

        assert_eq!(settings.discovery.cooldown(), Duration::from_secs(10));
        assert_eq!(settings.discovery.timeout(), Duration::from_secs(10));
        assert_eq!(settings.control.timeout(), Duration::from_secs(10));
        assert_eq!(settings.control.backend, ControlBackendKind::Catt);
        assert_eq!(settings.discovery.backend, DiscoveryBackendKind::Catt);
        assert!(!settings.persistence.enabled);
        assert_eq!(settings.control.cast_port, 8009);
    }

    #[test]
    fn file_values_override_defaults() {
        let toml = r#"
            [discovery]
            backend = "mdns"
            cooldown_secs = 30

            [control]
            backend = "cast_lib"
            timeout_secs = 4

            [persistence]
            enabled = true
            path = "/var/lib/castctl/devices.json"
        "#;

        let settings = Settings::from_source(File::from_str(toml, FileFormat::Toml)).unwrap();

        assert_eq!(settings.discovery.backend, DiscoveryBackendKind::Mdns);
        assert_eq!(settings.discovery.cooldown(), Duration::from_secs(30));
        assert_eq!(settings.control.backend, ControlBackendKind::CastLib);
        assert_eq!(settings.control.timeout(), Duration::from_secs(4));
        assert!(settings.persistence.enabled);
        assert_eq!(settings.persistence.path, "/var/lib/castctl/devices.json");
        assert_eq!(settings.control.catt_path, "catt");
    }
}

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controllers::nv40::config::Nv40ControllerConfig;

pub const DEFAULT_CONFIG_PATH: &str = "nv40_config.toml";
pub const ENV_PREFIX: &str = "NV40";

fn default_max_retries() -> u32 {
    3
}

/// A named transport a controller can be attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PortConfig {
    Tcp {
        address: String,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
    Serial {
        path: String,
        baud_rate: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ports: BTreeMap<String, PortConfig>,
    #[serde(default)]
    pub controllers: Vec<Nv40ControllerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let controller = Nv40ControllerConfig::default();

        let mut ports = BTreeMap::new();
        ports.insert(
            controller.transport_port.clone(),
            PortConfig::Tcp {
                address: "127.0.0.1:4001".to_string(),
                max_retries: default_max_retries(),
            },
        );

        Self {
            ports,
            controllers: vec![controller],
        }
    }
}

impl Config {
    /// Looks a transport port up by name. Keys may come back lowercased
    /// from the config loader, so an exact miss falls back to a
    /// case-insensitive match, but only when that match is unique.
    pub fn port(&self, name: &str) -> Option<&PortConfig> {
        if let Some(port) = self.ports.get(name) {
            return Some(port);
        }

        let mut matches = self
            .ports
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name));
        match (matches.next(), matches.next()) {
            (Some((_, port)), None) => Some(port),
            (Some(_), Some(_)) => {
                warn!(port = name, "port name matches several ports when case is ignored");
                None
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for controller in &self.controllers {
            controller.validate().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write configuration file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Configuration validation failed: {0}")]
    Invalid(String),
}

pub fn config_path() -> PathBuf {
    std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Writes the default configuration unless a file is already there.
pub fn create_default_config<P: AsRef<Path>>(path: Option<P>) -> Result<(), ConfigError> {
    let config_path = path
        .map(|p| p.as_ref().to_path_buf())
        .unwrap_or_else(config_path);

    if config_path.exists() {
        info!(path = %config_path.display(), "configuration file exists, not overwriting");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = toml::to_string_pretty(&Config::default())?;
    fs::write(&config_path, content)?;

    info!(path = %config_path.display(), "default configuration written");
    Ok(())
}

/// Loads `path` layered with `NV40__`-prefixed environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<(config::Config, Config), ConfigError> {
    let source = config::Config::builder()
        .add_source(
            config::File::from(path.as_ref())
                .format(config::FileFormat::Toml)
                .required(true),
        )
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let config: Config = source.clone().try_deserialize()?;
    config.validate()?;

    Ok((source, config))
}

pub fn init_config() -> Result<(config::Config, Config), ConfigError> {
    load_config(config_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nv40.toml");

        create_default_config(Some(&path)).unwrap();
        let (_, config) = load_config(&path).unwrap();

        assert_eq!(config.controllers.len(), 1);
        let controller = &config.controllers[0];
        assert_eq!(controller.port_name, "NV40_1");
        assert_eq!(controller.num_axes, 3);
        assert_eq!(
            config.port(&controller.transport_port),
            Some(&PortConfig::Tcp {
                address: "127.0.0.1:4001".to_string(),
                max_retries: 3,
            })
        );
    }

    #[test]
    fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nv40.toml");
        fs::write(&path, "controllers = []\n").unwrap();

        create_default_config(Some(&path)).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "controllers = []\n");
    }

    #[test]
    fn parses_serial_and_tcp_ports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nv40.toml");
        fs::write(
            &path,
            r#"
[ports.bench_tcp]
type = "tcp"
address = "10.0.0.5:4001"

[ports.bench_serial]
type = "serial"
path = "/dev/ttyUSB0"
baud_rate = 9600

[[controllers]]
port_name = "NV40_A"
transport_port = "bench_serial"
num_axes = 2
poll_period_ms = 100
timeout_ms = 250
"#,
        )
        .unwrap();

        let (_, config) = load_config(&path).unwrap();

        assert_eq!(
            config.port("bench_serial"),
            Some(&PortConfig::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
            })
        );
        assert!(matches!(
            config.port("BENCH_TCP"),
            Some(PortConfig::Tcp { max_retries: 3, .. })
        ));

        let controller = &config.controllers[0];
        assert_eq!(controller.num_axes, 2);
        assert_eq!(controller.timeout_ms, 250);
        assert_eq!(controller.unit_scale, 1.0e6);
    }

    #[test]
    fn ambiguous_case_insensitive_port_is_not_guessed() {
        let mut config = Config::default();
        config.ports.clear();
        for (name, address) in [("Bench", "10.0.0.1:4001"), ("bench", "10.0.0.2:4001")] {
            config.ports.insert(
                name.to_string(),
                PortConfig::Tcp {
                    address: address.to_string(),
                    max_retries: 3,
                },
            );
        }

        assert!(matches!(
            config.port("bench"),
            Some(PortConfig::Tcp { address, .. }) if address == "10.0.0.2:4001"
        ));
        assert!(config.port("BENCH").is_none());

        config.ports.remove("Bench");
        assert!(config.port("BENCH").is_some());
    }

    #[test]
    fn invalid_controller_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nv40.toml");
        fs::write(
            &path,
            r#"
[[controllers]]
port_name = "NV40_A"
transport_port = "nowhere"
num_axes = 0
poll_period_ms = 100
"#,
        )
        .unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}

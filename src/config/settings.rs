//! Monitor configuration
//!
//! Loads device and gauge settings from a TOML file such as
//!
//! ```toml
//! [device]
//! host = "192.168.178.109"
//! port = 81
//! subprotocol = "arduino"
//!
//! [gauge]
//! element_id = "MoistureMeter"
//! total = 100.0
//! width = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::client::{Endpoint, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SUBPROTOCOL};
use crate::display::{Gauge, DEFAULT_ELEMENT_ID, DEFAULT_GAUGE_TOTAL, DEFAULT_GAUGE_WIDTH};

/// Configuration file name looked up in the working directory
pub const CONFIG_FILE: &str = "soilsensor.toml";

/// Errors that can occur during config operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where the sensor's WebSocket server lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Host name or IP address of the sensor
    #[serde(default = "default_host")]
    pub host: String,
    /// WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sub-protocol token; an empty string connects without one
    #[serde(default = "default_subprotocol")]
    pub subprotocol: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            subprotocol: default_subprotocol(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_subprotocol() -> String {
    DEFAULT_SUBPROTOCOL.to_string()
}

/// How the moisture gauge is drawn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GaugeConfig {
    /// Element id the readings are written to
    #[serde(default = "default_element_id")]
    pub element_id: String,
    /// Value that fills the gauge
    #[serde(default = "default_total")]
    pub total: f64,
    /// Bar width in characters
    #[serde(default = "default_width")]
    pub width: usize,
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self {
            element_id: default_element_id(),
            total: default_total(),
            width: default_width(),
        }
    }
}

fn default_element_id() -> String {
    DEFAULT_ELEMENT_ID.to_string()
}

fn default_total() -> f64 {
    DEFAULT_GAUGE_TOTAL
}

fn default_width() -> usize {
    DEFAULT_GAUGE_WIDTH
}

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub gauge: GaugeConfig,
}

impl MonitorConfig {
    /// Load configuration from a file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: MonitorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that would only fail later at connect or draw time
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.host.trim().is_empty() {
            return Err(ConfigError::Invalid("device.host cannot be empty".to_string()));
        }
        if self.device.port == 0 {
            return Err(ConfigError::Invalid("device.port cannot be 0".to_string()));
        }
        if self.gauge.element_id.is_empty() {
            return Err(ConfigError::Invalid(
                "gauge.element_id cannot be empty".to_string(),
            ));
        }
        if self.gauge.total.is_nan() || self.gauge.total <= 0.0 {
            return Err(ConfigError::Invalid(
                "gauge.total must be greater than 0".to_string(),
            ));
        }
        if self.gauge.width == 0 {
            return Err(ConfigError::Invalid(
                "gauge.width must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint described by the device section
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.device.host.clone())
            .with_port(self.device.port)
            .with_subprotocol(
                Some(self.device.subprotocol.clone()).filter(|p| !p.is_empty()),
            )
    }

    /// Gauge described by the gauge section
    pub fn gauge(&self) -> Gauge {
        Gauge::new(self.gauge.total, self.gauge.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let dir = tempdir().unwrap();
        let config = MonitorConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.endpoint().url(), "ws://soilsensor.local:81/");
        assert_eq!(config.gauge.element_id, "MoistureMeter");
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
[device]
host = "192.168.178.109"

[gauge]
total = 1023.0
"#,
        )
        .unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.device.host, "192.168.178.109");
        assert_eq!(config.device.port, 81);
        assert_eq!(config.device.subprotocol, "arduino");
        assert_eq!(config.gauge.total, 1023.0);
        assert_eq!(config.gauge.width, DEFAULT_GAUGE_WIDTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = MonitorConfig::default();
        config.device.host = "10.0.0.7".to_string();
        config.device.port = 8181;
        config.device.subprotocol = String::new();
        config.gauge.width = 12;

        config.save(&path).unwrap();
        assert!(path.exists());

        let loaded = MonitorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.endpoint().subprotocol, None);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[device\nhost = ").unwrap();

        let result = MonitorConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MonitorConfig::default();
        config.device.port = 0;
        assert!(config.validate().unwrap_err().to_string().contains("port"));

        let mut config = MonitorConfig::default();
        config.gauge.total = 0.0;
        assert!(config.validate().unwrap_err().to_string().contains("total"));

        let mut config = MonitorConfig::default();
        config.device.host = String::new();
        assert!(config.validate().is_err());
    }
}

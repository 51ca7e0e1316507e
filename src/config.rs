//! Configuration for the adapter binary
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Secrets never live in the file: the connection
//! string is read from the environment variable named in `[device]` or from
//! the persisted credentials file.

use crate::adapter::{AdapterOptions, Timing};
use crate::transport::DEFAULT_API_VERSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Locations tried, in order, when no config path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["iothub.toml", "config/iothub.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    pub device: DeviceSection,
    pub timing: TimingSection,
    pub mqtt: MqttSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSection {
    /// 64-bit hardware id as hex, with or without `0x`
    pub id: Option<String>,
    /// Where `set-credentials` persists the raw connection string
    pub credentials_file: Option<PathBuf>,
    /// Environment variable holding a connection string applied at startup
    pub connection_string_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSection {
    /// Cadence of the reconnect/watchdog tick
    pub tick_interval_ms: u64,
    pub push_period_ms: u32,
    /// Zero disables the watchdog
    pub watchdog_period_ms: u32,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            push_period_ms: 5000,
            watchdog_period_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttSection {
    pub api_version: String,
    pub keep_alive_secs: u64,
    /// Pause before the MQTT client retries a failed connection
    pub reconnect_delay_ms: u64,
    /// Outbound publishes buffered before `send` reports a full queue
    pub queue_capacity: usize,
    /// Network interface whose operstate gates connection attempts
    pub link_interface: Option<String>,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 10_000,
            queue_capacity: 64,
            link_interface: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AdapterConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AdapterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the first default path that exists,
    /// else built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|candidate| candidate.is_file())
        {
            Some(found) => Self::load_from_file(found),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device_id()?;

        if self.timing.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "timing.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must not exceed {}",
                u16::MAX
            )));
        }
        if self.mqtt.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.mqtt.api_version.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.api_version must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Hardware id reported in telemetry; zero when unset
    pub fn device_id(&self) -> Result<u64, ConfigError> {
        match self.device.id.as_deref() {
            None => Ok(0),
            Some(raw) => parse_device_id(raw),
        }
    }

    /// Connection string from the configured environment variable, if any
    pub fn connection_string(&self) -> Result<Option<String>, ConfigError> {
        match &self.device.connection_string_env {
            None => Ok(None),
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
        }
    }

    pub fn timing(&self) -> Timing {
        Timing::new(self.timing.push_period_ms, self.timing.watchdog_period_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.timing.tick_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.mqtt.reconnect_delay_ms)
    }

    pub fn adapter_options(&self) -> Result<AdapterOptions, ConfigError> {
        Ok(AdapterOptions {
            device_id: self.device_id()?,
            api_version: self.mqtt.api_version.clone(),
            keep_alive_secs: self.mqtt.keep_alive_secs,
            timing: self.timing(),
        })
    }
}

fn parse_device_id(raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 16 {
        return Err(ConfigError::InvalidDeviceId(format!(
            "'{raw}' must be 1 to 16 hex digits"
        )));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|_| ConfigError::InvalidDeviceId(format!("'{raw}' is not hexadecimal")))
}

//! Application settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::bridge::CasterConfig;
use crate::core::handshake::DeviceFamily;
use crate::core::logger::{LogFormat, DEFAULT_HISTORY_LINES};
use crate::core::session::DriverTimings;
use crate::core::transport::SerialConfig;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Receiver serial port
    pub serial: SerialSettings,
    /// Receiver handshake
    pub receiver: ReceiverConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// NTRIP casters to feed
    pub casters: Vec<CasterConfig>,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        super::config_dir()
            .map(|dir| dir.join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the default location, falling back to defaults when absent
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check values a running relay depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial.port is empty".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be non-zero".to_string()));
        }
        if self.receiver.command_timeout_ms == 0 || self.receiver.stall_timeout_ms == 0 {
            return Err(ConfigError::Invalid("receiver timeouts must be non-zero".to_string()));
        }
        for (n, caster) in self.casters.iter().enumerate() {
            if caster.address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("casters[{n}].address is empty")));
            }
            if caster.port == 0 {
                return Err(ConfigError::Invalid(format!("casters[{n}].port must be non-zero")));
            }
        }
        Ok(())
    }

    /// Serial transport settings
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig::new(&self.serial.port, self.serial.baud_rate)
            .read_timeout_ms(self.serial.read_timeout_ms)
    }

    /// Casters marked enabled
    pub fn enabled_casters(&self) -> impl Iterator<Item = &CasterConfig> {
        self.casters.iter().filter(|c| c.enabled)
    }
}

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
        }
    }
}

/// Receiver handshake settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Receiver family
    pub family: DeviceFamily,
    /// Resend interval for unacknowledged commands
    pub command_timeout_ms: u64,
    /// Restart initialization after this long without a valid frame
    pub stall_timeout_ms: u64,
    /// Delay before the first stall check
    pub startup_delay_ms: u64,
    /// Initialize immediately instead of waiting for the stall timer
    pub initialize_on_start: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            family: DeviceFamily::Quectel,
            command_timeout_ms: 8000,
            stall_timeout_ms: 60_000,
            startup_delay_ms: 10_000,
            initialize_on_start: false,
        }
    }
}

impl ReceiverConfig {
    /// Driver timers from these settings
    pub fn timings(&self) -> DriverTimings {
        DriverTimings {
            command_timeout_ms: self.command_timeout_ms,
            stall_timeout_ms: self.stall_timeout_ms,
            startup_delay_ms: self.startup_delay_ms,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily log files; console only when unset
    pub directory: Option<PathBuf>,
    /// Lines kept in the in-memory history
    pub history_lines: usize,
    /// Seconds between status summaries
    pub status_interval_secs: u64,
    /// Format used when dumping history on shutdown
    pub history_format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            history_lines: DEFAULT_HISTORY_LINES,
            status_interval_secs: 60,
            history_format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.receiver.command_timeout_ms, 8000);
        assert_eq!(config.receiver.stall_timeout_ms, 60_000);
        assert_eq!(config.logging.history_lines, 200);
        assert!(config.casters.is_empty());
        assert_eq!(config.receiver.timings(), DriverTimings::default());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyUSB0"

            [receiver]
            family = "unicore"

            [logging]
            history_format = "json_lines"

            [[casters]]
            address = "rtk2go.com"
            mountpoint = "BASE1"
            password = "pw"
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.receiver.family, DeviceFamily::Unicore);
        assert_eq!(config.logging.history_format, LogFormat::JsonLines);
        assert_eq!(config.casters[0].port, 2101);
        assert!(config.casters[0].enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_path_in_config_dir() {
        if let Some(dir) = crate::config::config_dir() {
            assert_eq!(AppConfig::default_path().unwrap(), dir.join("config.toml"));
        }
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.serial.port = "COM3".to_string();
        assert!(config.validate().is_ok());
        config.casters.push(CasterConfig {
            port: 0,
            ..CasterConfig::new("host", 2101, "M", "p")
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.serial.port = "COM7".to_string();
        config.casters.push(CasterConfig::new("caster.local", 2102, "M1", "secret"));
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(AppConfig::load(&missing), Err(ConfigError::Read { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "serial = 5").unwrap();
        assert!(matches!(AppConfig::load(&bad), Err(ConfigError::Parse { .. })));
    }
}

//! Application settings

use super::ConfigError;
use crate::core::logger::LogFormat;
use crate::core::scan::{NoResponseLogging, ScanRequest, ScanSettings};
use crate::core::transport::{ConnectionConfig, Parity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default link settings
    pub connection: ConnectionSettings,
    /// Default scan parameters
    pub scan: ScanDefaults,
    /// Event log settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the platform config directory, or defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the platform config directory
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Default link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    pub parity: Parity,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let config = ConnectionConfig::default();
        Self {
            port: config.port,
            baud_rate: config.baud_rate,
            parity: config.parity,
        }
    }
}

impl ConnectionSettings {
    /// Build the transport configuration
    pub fn to_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(&self.port, self.baud_rate).parity(self.parity)
    }
}

/// Default scan parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanDefaults {
    /// Slave id
    pub slave_id: u8,
    /// First address
    pub start: u16,
    /// Number of addresses
    pub count: u32,
    /// Function code
    pub function_code: u8,
    /// Pause after each read (milliseconds)
    pub pacing_ms: u64,
    /// Whether silent registers are logged
    pub no_response: NoResponseLogging,
}

impl Default for ScanDefaults {
    fn default() -> Self {
        let settings = ScanSettings::default();
        Self {
            slave_id: 1,
            start: 0,
            count: 10,
            function_code: 3,
            pacing_ms: u64::try_from(settings.pacing.as_millis()).unwrap_or(50),
            no_response: settings.no_response,
        }
    }
}

impl ScanDefaults {
    /// Controller settings
    pub fn settings(&self) -> ScanSettings {
        ScanSettings {
            pacing: Duration::from_millis(self.pacing_ms),
            no_response: self.no_response,
        }
    }

    /// Request built from the defaults
    pub fn request(&self) -> ScanRequest {
        ScanRequest::new(self.slave_id, self.start, self.count).function_code(self.function_code)
    }
}

/// Event log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Mirror the event log to this file
    pub file: Option<PathBuf>,
    /// File format
    pub format: LogFormat,
    /// In-memory entries kept
    pub max_buffer: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            format: LogFormat::Text,
            max_buffer: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.connection.parity, Parity::None);
        assert_eq!(config.scan.slave_id, 1);
        assert_eq!(config.scan.count, 10);
        assert_eq!(config.scan.function_code, 3);
        assert_eq!(config.scan.settings(), ScanSettings::default());
        assert_eq!(config.logging.max_buffer, 10_000);
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [connection]
            port = "/dev/ttyUSB0"
            parity = "even"

            [scan]
            pacing_ms = 20
            no_response = "log"
            "#,
        )
        .unwrap();

        let link = config.connection.to_config();
        assert_eq!(link.port, "/dev/ttyUSB0");
        assert_eq!(link.baud_rate, 9600);
        assert_eq!(link.parity, Parity::Even);
        assert_eq!(config.scan.settings().pacing, Duration::from_millis(20));
        assert_eq!(config.scan.no_response, NoResponseLogging::Log);
        assert_eq!(config.scan.request(), ScanRequest::new(1, 0, 10));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.connection.port = "COM7".to_string();
        config.scan.start = 40001;
        config.logging.file = Some(dir.path().join("session.log"));
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\ncount = \"many\"\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }
}

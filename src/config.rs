use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CompassError, Result};

/// Rolling history length.
pub const MAX_POINTS: usize = 100;
pub const DEFAULT_SERIAL_PORT: &str = "COM7";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_REFRESH_MS: u64 = 500;
pub const DEFAULT_EXPORT_FILE: &str = "sensor_data.csv";
pub const DEFAULT_HTTP_PORT: u16 = 8081;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Serial,
    Simulator,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub source: SourceKind,
    pub serial: SerialConfig,
    pub capacity: usize,
    pub refresh_interval_ms: u64,
    pub export_path: PathBuf,
    pub http_port: u16,
    /// Begin in the running state instead of waiting for the first toggle
    pub autostart: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Serial,
            serial: SerialConfig::default(),
            capacity: MAX_POINTS,
            refresh_interval_ms: DEFAULT_REFRESH_MS,
            export_path: PathBuf::from(DEFAULT_EXPORT_FILE),
            http_port: DEFAULT_HTTP_PORT,
            autostart: false,
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CompassError::InvalidConfig(
                "history capacity must be at least 1".to_string(),
            ));
        }
        if self.refresh_interval_ms == 0 {
            return Err(CompassError::InvalidConfig(
                "refresh interval must be non-zero".to_string(),
            ));
        }
        if self.source == SourceKind::Serial && self.serial.port.trim().is_empty() {
            return Err(CompassError::InvalidConfig(
                "serial port name is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.refresh_interval(), Duration::from_millis(500));
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.export_path, PathBuf::from("sensor_data.csv"));
        assert_eq!(config.source, SourceKind::Serial);
        assert!(!config.autostart);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = DashboardConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CompassError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = DashboardConfig {
            refresh_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_port_only_matters_for_serial() {
        let mut config = DashboardConfig::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());

        config.source = SourceKind::Simulator;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_kind_serializes_lowercase() {
        let json = serde_json::to_string(&SourceKind::Simulator).unwrap();
        assert_eq!(json, "\"simulator\"");
    }
}

//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::busy::BusyCheck;
use crate::loopback::{LoopbackSettings, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RS-232 self-test configuration
    pub serial: SerialTestConfig,
    /// Unit identity configuration
    pub identity: IdentityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        let serial = &self.serial;
        if serial.device.trim().is_empty() {
            return Err(ConfigError::invalid("serial.device", "must not be empty"));
        }
        if serial.baud == 0 {
            return Err(ConfigError::invalid("serial.baud", "must be greater than zero"));
        }
        if serial.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "serial.timeout_secs",
                "must be greater than zero",
            ));
        }
        if serial.payload_bytes == 0 || serial.payload_bytes > MAX_PAYLOAD_LEN {
            return Err(ConfigError::invalid(
                "serial.payload_bytes",
                format!("must be between 1 and {MAX_PAYLOAD_LEN}"),
            ));
        }
        Ok(())
    }
}

/// RS-232 self-test section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialTestConfig {
    /// Device node under test
    pub device: String,
    /// Baud rate for the loopback exchange
    pub baud: u32,
    /// Hard deadline for the loopback read, in seconds
    pub timeout_secs: u64,
    /// Payload length in bytes
    pub payload_bytes: usize,
    /// Master switch for every RS-232 check
    pub rs232_test: bool,
    /// Byte loopback (TX jumpered to RX)
    pub loopback_enabled: bool,
    /// Modem-line loopback (needs RTS/CTS and DTR/DSR/DCD/RI jumpers)
    pub modem_enabled: bool,
    /// How to detect processes already holding the device
    pub busy_check: BusyCheck,
}

impl Default for SerialTestConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud: 115200,
            timeout_secs: 5,
            payload_bytes: 64,
            rs232_test: true,
            loopback_enabled: true,
            modem_enabled: false,
            busy_check: BusyCheck::System,
        }
    }
}

impl SerialTestConfig {
    /// Get the loopback deadline as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Settings for the tester, honouring the master switch.
    pub fn loopback_settings(&self) -> LoopbackSettings {
        LoopbackSettings {
            device: self.device.clone(),
            baud_rate: self.baud,
            timeout: self.timeout(),
            payload_len: self.payload_bytes,
            byte_loopback: self.rs232_test && self.loopback_enabled,
            modem_lines: self.rs232_test && self.modem_enabled,
        }
    }
}

/// Unit identity section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Product Serial Number; detected from the system when unset
    pub serial_number: Option<String>,
    /// Filesystem root the detection reads from
    pub root: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            serial_number: None,
            root: PathBuf::from("/"),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line format with source locations
    Pretty,
    /// Single-line format
    #[default]
    Compact,
}

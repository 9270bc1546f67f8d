//! Application-level errors.
//!
//! Only these propagate as a hard failure. Everything else the tester finds is
//! recorded in the report as WARN or SKIP.

use crate::config::ConfigError;
use crate::port::PortError;
use thiserror::Error;

/// Unified hard-failure type for a QC run.
#[derive(Debug, Error)]
pub enum QcError {
    /// The device exists but the current user may not open or configure it.
    #[error("permission denied on {device}; run as root or add the user to the dialout group")]
    PermissionDenied { device: String },

    /// The operating system refused the terminal configuration.
    #[error("{device} rejected the serial configuration: {message}")]
    ConfigRejected { device: String, message: String },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failure outside the device itself (stdout, config file writes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QcError {
    /// Promote a hard port failure to a `QcError`; soft failures come back as `Err`.
    pub fn from_port(device: &str, err: PortError) -> Result<Self, PortError> {
        match err {
            PortError::PermissionDenied(_) => Ok(Self::PermissionDenied {
                device: device.to_string(),
            }),
            PortError::Config(message) => Ok(Self::ConfigRejected {
                device: device.to_string(),
                message,
            }),
            other => Err(other),
        }
    }
}

//! Configuration module for nexbox-qc.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `NEXBOX_QC_CONFIG` environment variable (explicit path)
//! 2. `./nexbox-qc.toml` (current directory)
//! 3. `~/.config/nexbox-qc/config.toml` (XDG on Linux)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `NEXBOX_QC_<SECTION>_<KEY>`
//!
//! Examples:
//! - `NEXBOX_QC_SERIAL_DEVICE=/dev/ttyS1`
//! - `NEXBOX_QC_SERIAL_MODEM_ENABLED=1`
//! - `NEXBOX_QC_LOGGING_LEVEL=debug`
//!
//! The provisioning pipeline's variables are also supported:
//! - `SERIAL_DEV`, `SERIAL_BAUD`, `SERIAL_TIMEOUT_SEC`, `LOOPBACK_BYTES`
//! - `ENABLE_RS232_TEST`, `ENABLE_RS232_MODEM`, `SERIAL_NUMBER`
//!
//! # Example
//!
//! ```rust,no_run
//! use nexbox_qc::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Device under test: {}", config.serial.device);
//! # Ok::<(), nexbox_qc::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, IdentityConfig, LogFormat, LoggingConfig, SerialTestConfig};

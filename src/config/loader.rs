//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use crate::busy::BusyCheck;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "NEXBOX_QC";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE_NAME: &str = "nexbox-qc.toml";

/// Config file name inside the per-user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "NEXBOX_QC_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `NEXBOX_QC_CONFIG` environment variable (explicit path)
    /// 2. `./nexbox-qc.toml` (current directory)
    /// 3. `<user config dir>/nexbox-qc/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Built-in defaults only; no file, no environment.
    pub fn with_defaults() -> Self {
        Self {
            config_path: None,
            config: Config::default(),
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Per-user config directory
    get_default_config_path().filter(|path| path.exists())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "nexbox-qc")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply process environment overrides to the configuration.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    apply_overrides(config, |var| std::env::var(var).ok())
}

/// Apply overrides looked up through `lookup`.
///
/// Prefixed variables follow `NEXBOX_QC_<SECTION>_<KEY>`; the variables the
/// provisioning pipeline already exports (`SERIAL_DEV`, `SERIAL_BAUD`, ...) are
/// accepted as fallbacks.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str, legacy: Option<&str>| -> Option<(String, String)> {
        let prefixed = format!("{ENV_PREFIX}_{key}");
        if let Some(value) = lookup(&prefixed) {
            return Some((prefixed, value));
        }
        legacy.and_then(|name| lookup(name).map(|value| (name.to_string(), value)))
    };

    // Serial overrides
    if let Some((_, val)) = var("SERIAL_DEVICE", Some("SERIAL_DEV")) {
        config.serial.device = val;
    }
    if let Some((name, val)) = var("SERIAL_BAUD", Some("SERIAL_BAUD")) {
        config.serial.baud = parse_number(&name, &val, "a baud rate")?;
    }
    if let Some((name, val)) = var("SERIAL_TIMEOUT_SECS", Some("SERIAL_TIMEOUT_SEC")) {
        config.serial.timeout_secs = parse_number(&name, &val, "whole seconds")?;
    }
    if let Some((name, val)) = var("SERIAL_PAYLOAD_BYTES", Some("LOOPBACK_BYTES")) {
        config.serial.payload_bytes = parse_number(&name, &val, "a byte count")?;
    }
    if let Some((name, val)) = var("SERIAL_RS232_TEST", Some("ENABLE_RS232_TEST")) {
        config.serial.rs232_test = parse_flag(&name, &val)?;
    }
    if let Some((name, val)) = var("SERIAL_LOOPBACK_ENABLED", None) {
        config.serial.loopback_enabled = parse_flag(&name, &val)?;
    }
    if let Some((name, val)) = var("SERIAL_MODEM_ENABLED", Some("ENABLE_RS232_MODEM")) {
        config.serial.modem_enabled = parse_flag(&name, &val)?;
    }
    if let Some((name, val)) = var("SERIAL_BUSY_CHECK", None) {
        config.serial.busy_check = match val.trim().to_ascii_lowercase().as_str() {
            "system" => BusyCheck::System,
            "none" => BusyCheck::None,
            _ => return Err(ConfigError::env(name, val.as_str(), "'system' or 'none'")),
        };
    }

    // Identity overrides
    if let Some((_, val)) = var("IDENTITY_SERIAL_NUMBER", Some("SERIAL_NUMBER")) {
        if !val.trim().is_empty() {
            config.identity.serial_number = Some(val.trim().to_string());
        }
    }

    // Logging overrides
    if let Some((_, val)) = var("LOGGING_LEVEL", None) {
        config.logging.level = val;
    }

    Ok(())
}

fn parse_number<T: FromStr>(var: &str, value: &str, expected: &'static str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(var, value, expected))
}

/// Accepts the spellings shell scripts use for booleans.
fn parse_flag(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::env(var, value, "a boolean (1/0, true/false)")),
    }
}

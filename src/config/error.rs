//! Errors raised while loading, checking and saving the QC configuration.

use std::path::PathBuf;
use thiserror::Error;

/// A configuration problem; any of these stops the run before a port is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {} is not valid TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Only reachable through `--print-config` / `--write-config`.
    #[error("cannot render configuration as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("cannot write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A loaded value is outside what the tester accepts.
    #[error("{key} {reason}")]
    Invalid { key: String, reason: String },

    /// An environment override could not be interpreted.
    #[error("{var}={value:?}: expected {expected}")]
    Env {
        var: String,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn env(var: impl Into<String>, value: impl Into<String>, expected: &'static str) -> Self {
        Self::Env {
            var: var.into(),
            value: value.into(),
            expected,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

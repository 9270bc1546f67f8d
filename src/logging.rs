//! Tracing setup for the QC binary.
//!
//! Diagnostics go to stderr so that stdout carries only the report. `RUST_LOG`
//! wins over the configured level; each `-v` raises the default by one step.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

/// Install the global subscriber.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init(config: &LoggingConfig, verbose: u8) {
    let level = effective_level(&config.level, verbose);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimer);

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.pretty())
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.compact().with_target(false))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Configured level raised by `verbose` steps, capped at TRACE.
pub fn effective_level(configured: &str, verbose: u8) -> LevelFilter {
    const LADDER: [LevelFilter; 6] = [
        LevelFilter::OFF,
        LevelFilter::ERROR,
        LevelFilter::WARN,
        LevelFilter::INFO,
        LevelFilter::DEBUG,
        LevelFilter::TRACE,
    ];

    let base: LevelFilter = configured.trim().parse().unwrap_or(LevelFilter::WARN);
    let index = LADDER.iter().position(|l| *l == base).unwrap_or(2);
    LADDER[(index + verbose as usize).min(LADDER.len() - 1)]
}

// Local wall-clock time to the millisecond; the default UTC timer is noisy on
// a bench console.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

//! # Logger Module
//!
//! Installs a `tracing-subscriber` registry for hosts that do not bring
//! their own. `RUST_LOG` takes priority; without it the configured level
//! applies to every target.
//!
//! ```bash
//! RUST_LOG=clickhouse_dialect::reflection=debug cargo test
//! ```
//!
//! Compiled statements and catalog queries are logged at `DEBUG`; soft
//! reflection failures (unknown types, unknown engines) at `WARN`.

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerLevel {
    #[serde(alias = "DEBUG", alias = "debug")]
    Debug,
    #[serde(alias = "INFO", alias = "info")]
    Info,
    #[serde(alias = "WARN", alias = "warn")]
    Warn,
    #[serde(alias = "ERROR", alias = "error")]
    Error,
}

impl LoggerLevel {
    pub fn to_tracing_level(&self) -> LevelFilter {
        match self {
            LoggerLevel::Debug => LevelFilter::DEBUG,
            LoggerLevel::Info => LevelFilter::INFO,
            LoggerLevel::Warn => LevelFilter::WARN,
            LoggerLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    #[serde(alias = "JSON", alias = "json")]
    Json,
    #[serde(alias = "TEXT", alias = "text")]
    Text,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggerSettings {
    #[serde(default = "default_log_level")]
    pub level: LoggerLevel,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Write to stdout instead of stderr.
    #[serde(default)]
    pub stdout: bool,
}

fn default_log_level() -> LoggerLevel {
    LoggerLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggerSettings {
    fn default() -> Self {
        LoggerSettings {
            level: default_log_level(),
            format: default_log_format(),
            stdout: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized(#[from] TryInitError),
}

fn env_filter(settings: &LoggerSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.to_tracing_level().to_string()))
}

pub fn setup_logging(settings: &LoggerSettings) -> Result<(), LoggerError> {
    let env_filter = env_filter(settings);
    let format_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    match (settings.format, settings.stdout) {
        (LogFormat::Json, true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(format_layer.with_writer(std::io::stdout).json())
            .try_init()?,
        (LogFormat::Json, false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(format_layer.with_writer(std::io::stderr).json())
            .try_init()?,
        (LogFormat::Text, true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(format_layer.with_writer(std::io::stdout).compact())
            .try_init()?,
        (LogFormat::Text, false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(format_layer.with_writer(std::io::stderr).compact())
            .try_init()?,
    }
    Ok(())
}

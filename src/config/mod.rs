//! Application settings
//!
//! Settings come from a [`ConfigService`], normally loaded from the process
//! environment:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `CONDUCTOR_START_TIMEOUT` | deadline for OnStart hooks in `run` | `15s` |
//! | `CONDUCTOR_STOP_TIMEOUT` | deadline for OnStop hooks in `run` | `15s` |
//! | `CONDUCTOR_LOGGER` | `tracing`, `console`, `json` or `nop` | `tracing` |
//!
//! Durations accept `ms`, `s` and `m` suffixes, or `none` for no deadline.

use crate::event::{ConsoleLogger, EventLogger, Format, NopLogger, TracingLogger};
use dashmap::DashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const START_TIMEOUT_KEY: &str = "CONDUCTOR_START_TIMEOUT";
pub const STOP_TIMEOUT_KEY: &str = "CONDUCTOR_STOP_TIMEOUT";
pub const LOGGER_KEY: &str = "CONDUCTOR_LOGGER";

/// Default deadline for each phase of `run`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration for {key}: {value:?}")]
    InvalidDuration { key: String, value: String },

    #[error("unknown logger for {key}: {value:?}")]
    UnknownLogger { key: String, value: String },
}

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// An empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration seeded from the process environment
    pub fn from_env() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }
}

/// Which built-in event logger to use when none is constructed explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LoggerKind {
    #[default]
    Tracing,
    Console,
    Json,
    #[strum(serialize = "nop", serialize = "none")]
    Nop,
}

impl LoggerKind {
    pub(crate) fn build(self) -> Arc<dyn EventLogger> {
        match self {
            LoggerKind::Tracing => Arc::new(TracingLogger),
            LoggerKind::Console => Arc::new(ConsoleLogger::stderr(Format::Text)),
            LoggerKind::Json => Arc::new(ConsoleLogger::stderr(Format::Json)),
            LoggerKind::Nop => Arc::new(NopLogger),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `None` waits for OnStart hooks indefinitely
    pub start_timeout: Option<Duration>,
    /// `None` waits for OnStop hooks indefinitely
    pub stop_timeout: Option<Duration>,
    pub logger: LoggerKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_timeout: Some(DEFAULT_TIMEOUT),
            stop_timeout: Some(DEFAULT_TIMEOUT),
            logger: LoggerKind::default(),
        }
    }
}

impl Settings {
    /// Read settings from `config`, falling back to defaults for absent keys
    pub fn from_config(config: &ConfigService) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(value) = config.get(START_TIMEOUT_KEY) {
            settings.start_timeout = parse_timeout(START_TIMEOUT_KEY, &value)?;
        }
        if let Some(value) = config.get(STOP_TIMEOUT_KEY) {
            settings.stop_timeout = parse_timeout(STOP_TIMEOUT_KEY, &value)?;
        }
        if let Some(value) = config.get(LOGGER_KEY) {
            settings.logger = value.trim().parse().map_err(|_: strum::ParseError| {
                ConfigError::UnknownLogger {
                    key: LOGGER_KEY.to_string(),
                    value: value.clone(),
                }
            })?;
        }
        Ok(settings)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(&ConfigService::from_env())
    }
}

fn parse_timeout(key: &str, value: &str) -> Result<Option<Duration>, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        key: key.to_string(),
        value: value.to_string(),
    };
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.checked_mul(60).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(Some(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_config(&ConfigService::new()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.start_timeout, Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn test_reads_timeouts_and_logger() {
        let config = ConfigService::new();
        config.set(START_TIMEOUT_KEY, "500ms");
        config.set(STOP_TIMEOUT_KEY, "none");
        config.set(LOGGER_KEY, "JSON");

        let settings = Settings::from_config(&config).unwrap();
        assert_eq!(settings.start_timeout, Some(Duration::from_millis(500)));
        assert_eq!(settings.stop_timeout, None);
        assert_eq!(settings.logger, LoggerKind::Json);
    }

    #[test]
    fn test_rejects_malformed_values() {
        let config = ConfigService::new();
        config.set(START_TIMEOUT_KEY, "soon");
        assert!(matches!(
            Settings::from_config(&config),
            Err(ConfigError::InvalidDuration { .. })
        ));

        let config = ConfigService::new();
        config.set(LOGGER_KEY, "syslog");
        assert!(matches!(
            Settings::from_config(&config),
            Err(ConfigError::UnknownLogger { .. })
        ));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_timeout("k", "2m").unwrap(), Some(Duration::from_secs(120)));
        assert_eq!(parse_timeout("k", "3").unwrap(), Some(Duration::from_secs(3)));
        assert!(parse_timeout("k", "3h").is_err());
        assert!(parse_timeout("k", "").is_err());
        assert!(matches!(
            parse_timeout("k", "999999999999999999m"),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }
}

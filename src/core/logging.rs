//! Structured logging setup.
//!
//! The broker logs through `tracing`; this module installs the subscriber.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// Single-line output
    #[default]
    Compact,
    /// JSON lines
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level filter (e.g. "info", "debug")
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
    /// Per-target overrides (e.g. "intent_broker::broker=trace")
    #[serde(default)]
    pub directives: Vec<String>,
    /// Use ANSI colors
    #[serde(default)]
    pub ansi: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            directives: Vec::new(),
            ansi: false,
        }
    }
}

impl LogConfig {
    /// Add a directive override.
    pub fn with_directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Build the env filter described by this config.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| Error::Internal(format!("invalid log level '{}': {}", self.level, e)))?;
        for directive in &self.directives {
            let parsed: Directive = directive
                .parse()
                .map_err(|e| Error::Internal(format!("invalid log directive '{}': {}", directive, e)))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global tracing subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> Result<bool> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .with_ansi(config.ansi);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    Ok(installed.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_with_directives() {
        let config = LogConfig::default().with_directive("intent_broker::broker=trace");
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_invalid_directive_rejected() {
        let config = LogConfig::default().with_directive("intent_broker=[[[");
        assert!(config.env_filter().is_err());
    }

    #[test]
    fn test_second_init_is_not_an_error() {
        let config = LogConfig::default();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }

    #[test]
    fn test_format_deserialization() {
        let config: LogConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }
}

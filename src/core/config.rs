//! Broker and client configuration.
//!
//! Configuration-driven setup of the application directory and timeouts.

use crate::core::logging::LogConfig;
use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default timeout for delivery acknowledgements, in milliseconds.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 10_000;

/// Default bound on waiting for the host's startup signal.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 60_000;

/// Broker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Applications allowed to connect
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
    /// Delivery acknowledgement timeout handed to in-process clients
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Logging setup
    #[serde(default)]
    pub log: LogConfig,
}

fn default_delivery_timeout_ms() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl BrokerConfig {
    /// Create a config for the given applications with default timeouts.
    pub fn with_applications(applications: Vec<ApplicationConfig>) -> Self {
        Self {
            applications,
            ..Default::default()
        }
    }

    /// Parse from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Client configuration derived from this broker configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
            ..Default::default()
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            applications: Vec::new(),
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            log: LogConfig::default(),
        }
    }
}

/// A known application, as registered with the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Unique symbolic name
    pub symbolic_name: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    /// Origin the application's contexts must connect from
    pub origin: String,
    /// Base URL of the application
    #[serde(default)]
    pub base_url: String,
    /// Let the application see private capabilities of other applications
    #[serde(default)]
    pub scope_check_disabled: bool,
    /// Forbid direct intention (un)registration
    #[serde(default = "default_true")]
    pub intention_register_api_disabled: bool,
}

impl ApplicationConfig {
    /// Create an application entry served from `origin`.
    pub fn new(symbolic_name: &str, origin: &str) -> Self {
        Self {
            symbolic_name: symbolic_name.to_string(),
            name: symbolic_name.to_string(),
            origin: origin.to_string(),
            base_url: origin.to_string(),
            scope_check_disabled: false,
            intention_register_api_disabled: true,
        }
    }

    /// Disable the visibility check for this application.
    pub fn with_scope_check_disabled(mut self) -> Self {
        self.scope_check_disabled = true;
        self
    }

    /// Allow direct intention registration.
    pub fn with_intention_register_api(mut self) -> Self {
        self.intention_register_api_disabled = false;
        self
    }
}

/// Per-context client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// How long to wait for a delivery acknowledgement
    pub delivery_timeout: Duration,
    /// Hold request/reply traffic until the host signals startup completion
    pub await_startup: bool,
    /// How long a held request waits for the startup signal
    pub startup_timeout: Duration,
}

impl ClientConfig {
    /// Set the delivery timeout.
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Set whether requests wait for host startup.
    pub fn with_await_startup(mut self, await_startup: bool) -> Self {
        self.await_startup = await_startup;
        self
    }

    /// Set how long requests wait for host startup.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
            await_startup: true,
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
        }
    }
}

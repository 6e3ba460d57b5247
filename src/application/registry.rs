//! Application registry.
//!
//! Static directory of the applications allowed to connect, loaded from
//! configuration when the broker starts.

use crate::core::ApplicationConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A known application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Unique symbolic name
    pub symbolic_name: String,
    /// Display name
    pub name: String,
    /// Origin its contexts connect from
    pub origin: String,
    /// Base URL
    pub base_url: String,
    /// Whether private capabilities of other applications are visible to it
    pub scope_check_disabled: bool,
    /// Whether direct intention (un)registration is forbidden
    pub intention_register_api_disabled: bool,
}

impl From<ApplicationConfig> for Application {
    fn from(config: ApplicationConfig) -> Self {
        let name = if config.name.is_empty() {
            config.symbolic_name.clone()
        } else {
            config.name
        };
        Self {
            symbolic_name: config.symbolic_name,
            name,
            origin: config.origin,
            base_url: config.base_url,
            scope_check_disabled: config.scope_check_disabled,
            intention_register_api_disabled: config.intention_register_api_disabled,
        }
    }
}

/// Directory of known applications, keyed by symbolic name.
#[derive(Clone, Debug, Default)]
pub struct ApplicationRegistry {
    applications: HashMap<String, Application>,
}

impl ApplicationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration. Later duplicates win.
    pub fn from_config(applications: &[ApplicationConfig]) -> Self {
        let mut registry = Self::new();
        for config in applications {
            registry.register(Application::from(config.clone()));
        }
        registry
    }

    /// Add an application, replacing one with the same symbolic name.
    pub fn register(&mut self, application: Application) {
        self.applications
            .insert(application.symbolic_name.clone(), application);
    }

    /// Look up an application.
    pub fn get(&self, symbolic_name: &str) -> Option<&Application> {
        self.applications.get(symbolic_name)
    }

    /// Whether the application may see other applications' private capabilities.
    ///
    /// Unknown applications get the strict default.
    pub fn is_scope_check_disabled(&self, symbolic_name: &str) -> bool {
        self.get(symbolic_name)
            .map(|app| app.scope_check_disabled)
            .unwrap_or(false)
    }

    /// Whether the application is barred from registering intentions directly.
    pub fn is_intention_register_api_disabled(&self, symbolic_name: &str) -> bool {
        self.get(symbolic_name)
            .map(|app| app.intention_register_api_disabled)
            .unwrap_or(true)
    }

    /// Number of known applications.
    pub fn len(&self) -> usize {
        self.applications.len()
    }

    /// Whether no application is known.
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

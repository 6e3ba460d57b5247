//! Intent router for capability-based routing.
//!
//! Resolves an issued intent to the connections of every application that
//! provides a matching capability visible to the sender.

use crate::broker::connection::ConnectionRegistry;
use crate::core::{Error, Result, TransportHandle};
use crate::manifest::{ManifestObject, ManifestRegistry};
use crate::transport::IntentMessage;
use std::collections::BTreeSet;
use tracing::debug;

/// Routing result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentRoute {
    /// Connections the intent must be delivered to, in handle order
    pub handles: Vec<TransportHandle>,
    /// Ids of the capabilities that satisfied the intent
    pub providers: Vec<String>,
}

/// Router metrics for monitoring.
#[derive(Clone, Debug, Default)]
pub struct RouterMetrics {
    /// Intents routed
    pub total_routes: u64,
    /// Intents that resolved to at least one provider
    pub successful_routes: u64,
    /// Intents rejected during routing
    pub failed_routes: u64,
}

/// Intent router.
#[derive(Debug, Default)]
pub struct IntentRouter {
    metrics: RouterMetrics,
}

impl IntentRouter {
    /// Create a new intent router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route an intent issued by `sender_app`.
    pub fn route(
        &mut self,
        manifest: &ManifestRegistry,
        connections: &ConnectionRegistry,
        sender_app: &str,
        intent: &IntentMessage,
    ) -> Result<IntentRoute> {
        self.metrics.total_routes += 1;
        let result = Self::resolve(manifest, connections, sender_app, intent);
        match &result {
            Ok(_) => self.metrics.successful_routes += 1,
            Err(_) => self.metrics.failed_routes += 1,
        }
        result
    }

    fn resolve(
        manifest: &ManifestRegistry,
        connections: &ConnectionRegistry,
        sender_app: &str,
        intent: &IntentMessage,
    ) -> Result<IntentRoute> {
        if intent.intent_type.is_empty() {
            return Err(Error::IntentDispatch("intent type is required".into()));
        }
        let qualifier = intent.qualifier.clone().unwrap_or_default();
        if !qualifier.is_concrete() {
            return Err(Error::IntentDispatch(format!(
                "intent qualifier must not contain wildcards: {:?}",
                qualifier
            )));
        }

        if !manifest.is_qualified(sender_app, &intent.intent_type, &qualifier) {
            return Err(Error::NotQualified(format!(
                "application '{}' has not declared an intention for '{}' {:?}",
                sender_app, intent.intent_type, qualifier
            )));
        }

        let providers = manifest.resolve_providers(sender_app, &intent.intent_type, &qualifier);
        if providers.is_empty() {
            return Err(Error::NullCapabilityProvider(format!(
                "no application provides a capability visible to '{}' for '{}' {:?}",
                sender_app, intent.intent_type, qualifier
            )));
        }

        let apps: BTreeSet<&str> = providers.iter().map(|c| c.app_symbolic_name()).collect();
        let handles: Vec<TransportHandle> = apps
            .into_iter()
            .flat_map(|app| connections.handles_of(app))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if handles.is_empty() && intent.reply_to.is_some() {
            return Err(Error::NoReplier(format!(
                "no connected application handles '{}' requests",
                intent.intent_type
            )));
        }

        debug!(
            intent_type = %intent.intent_type,
            providers = providers.len(),
            connections = handles.len(),
            "intent resolved"
        );
        Ok(IntentRoute {
            handles,
            providers: providers.into_iter().map(|c| c.metadata.id).collect(),
        })
    }

    /// Get routing metrics.
    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }
}

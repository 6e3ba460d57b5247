//! Manifest registry.
//!
//! Owns the capability and intention stores and enforces the registration
//! rules: deterministic ids, implicit intentions for provided capabilities,
//! the intention registration toggle and capability visibility.

use crate::application::ApplicationRegistry;
use crate::core::{now, Error, Result};
use crate::manifest::id::{IdGenerator, Sha3IdGenerator};
use crate::manifest::model::{
    Capability, CapabilityDescriptor, Intention, IntentionDescriptor, ManifestObject,
    ManifestObjectFilter, ManifestObjectMetadata,
};
use crate::manifest::store::ManifestObjectStore;
use crate::qualifier::{matches_intent, matches_wildcard, Qualifier};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Registry of capabilities and intentions declared by applications.
pub struct ManifestRegistry {
    capabilities: ManifestObjectStore<Capability>,
    intentions: ManifestObjectStore<Intention>,
    applications: Arc<ApplicationRegistry>,
    id_generator: Arc<dyn IdGenerator>,
}

impl ManifestRegistry {
    /// Create a registry using SHA3 content-hash ids.
    pub fn new(applications: Arc<ApplicationRegistry>) -> Self {
        Self::with_id_generator(applications, Arc::new(Sha3IdGenerator))
    }

    /// Create a registry with a custom id generator.
    pub fn with_id_generator(
        applications: Arc<ApplicationRegistry>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            capabilities: ManifestObjectStore::new(),
            intentions: ManifestObjectStore::new(),
            applications,
            id_generator,
        }
    }

    /// Register a capability provided by `app`.
    ///
    /// Also registers the implicit intention for it. Returns the capability id.
    pub fn register_capability(&mut self, app: &str, descriptor: CapabilityDescriptor) -> Result<String> {
        if descriptor.capability_type.is_empty() {
            return Err(Error::CapabilityRegister("capability type is required".into()));
        }
        if descriptor.qualifier.has_wildcard_key() {
            return Err(Error::CapabilityRegister(
                "'*' is not allowed as a capability qualifier key".into(),
            ));
        }

        let id = self
            .id_generator
            .generate(app, &descriptor.capability_type, &descriptor.qualifier);
        let metadata = ManifestObjectMetadata {
            id: id.clone(),
            app_symbolic_name: app.to_string(),
            registered_at: now(),
        };

        // Own id: an explicit intention of the same identity must not replace it
        self.intentions.add(Intention {
            intention_type: descriptor.capability_type.clone(),
            qualifier: descriptor.qualifier.clone(),
            implicit: true,
            provided_by: Some(id.clone()),
            metadata: ManifestObjectMetadata {
                id: self.id_generator.implicit_intention_id(app, &id),
                ..metadata.clone()
            },
        });
        self.capabilities.add(Capability {
            capability_type: descriptor.capability_type,
            qualifier: descriptor.qualifier,
            visibility: descriptor.visibility,
            description: descriptor.description,
            properties: descriptor.properties,
            metadata,
        });

        info!(app = %app, id = %id, "capability registered");
        Ok(id)
    }

    /// Remove capabilities of `app` matching the filter exactly.
    ///
    /// The implicit intentions of removed capabilities go with them.
    /// Returns the removed ids.
    pub fn unregister_capabilities(&mut self, app: &str, filter: ManifestObjectFilter) -> Result<Vec<String>> {
        let filter = ManifestObjectFilter {
            app_symbolic_name: Some(app.to_string()),
            ..filter
        };
        let removed: Vec<String> = self
            .capabilities
            .remove(&filter)
            .into_iter()
            .map(|c| c.metadata.id)
            .collect();

        if !removed.is_empty() {
            self.intentions.remove_if(&ManifestObjectFilter::new().by_app(app), |intention| {
                intention.implicit
                    && intention
                        .provided_by
                        .as_ref()
                        .map(|id| removed.contains(id))
                        .unwrap_or(false)
            });
            info!(app = %app, count = removed.len(), "capabilities unregistered");
        }
        Ok(removed)
    }

    /// Register an intention declared by `app`. Returns the intention id.
    pub fn register_intention(&mut self, app: &str, descriptor: IntentionDescriptor) -> Result<String> {
        if self.applications.is_intention_register_api_disabled(app) {
            return Err(Error::IntentionRegister(format!(
                "intention registration API is disabled for application '{}'",
                app
            )));
        }
        if descriptor.intention_type.is_empty() {
            return Err(Error::IntentionRegister("intention type is required".into()));
        }

        let id = self
            .id_generator
            .generate(app, &descriptor.intention_type, &descriptor.qualifier);
        self.intentions.add(Intention {
            intention_type: descriptor.intention_type,
            qualifier: descriptor.qualifier,
            implicit: false,
            provided_by: None,
            metadata: ManifestObjectMetadata {
                id: id.clone(),
                app_symbolic_name: app.to_string(),
                registered_at: now(),
            },
        });

        info!(app = %app, id = %id, "intention registered");
        Ok(id)
    }

    /// Remove intentions of `app` matching the filter exactly.
    ///
    /// Implicit intentions are only removed when the filter names their id.
    pub fn unregister_intentions(&mut self, app: &str, filter: ManifestObjectFilter) -> Result<Vec<String>> {
        if self.applications.is_intention_register_api_disabled(app) {
            return Err(Error::IntentionRegister(format!(
                "intention registration API is disabled for application '{}'",
                app
            )));
        }

        let targeted = filter.id.clone();
        let filter = ManifestObjectFilter {
            app_symbolic_name: Some(app.to_string()),
            ..filter
        };
        let removed: Vec<String> = self
            .intentions
            .remove_if(&filter, |intention| {
                !intention.implicit || targeted.as_deref() == Some(intention.id())
            })
            .into_iter()
            .map(|i| i.metadata.id)
            .collect();

        if !removed.is_empty() {
            info!(app = %app, count = removed.len(), "intentions unregistered");
        }
        Ok(removed)
    }

    /// Capabilities matching the filter that `requester` may see.
    pub fn lookup_capabilities(&self, requester: &str, filter: &ManifestObjectFilter) -> Vec<Capability> {
        self.capabilities
            .find(filter, matches_wildcard)
            .into_iter()
            .filter(|capability| self.is_visible(capability, requester))
            .cloned()
            .collect()
    }

    /// Intentions matching the filter.
    pub fn lookup_intentions(&self, filter: &ManifestObjectFilter) -> Vec<Intention> {
        self.intentions
            .find(filter, matches_wildcard)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Whether `app` has declared an intention satisfied by `(intent_type, qualifier)`.
    pub fn is_qualified(&self, app: &str, intent_type: &str, qualifier: &Qualifier) -> bool {
        let filter = ManifestObjectFilter::new()
            .by_app(app)
            .by_type(intent_type)
            .by_qualifier(qualifier.clone());
        let qualified = !self.intentions.find(&filter, matches_intent).is_empty();
        debug!(app = %app, intent_type = %intent_type, qualified, "qualification check");
        qualified
    }

    /// Capabilities satisfying `(intent_type, qualifier)` that `requester` may see.
    pub fn resolve_providers(&self, requester: &str, intent_type: &str, qualifier: &Qualifier) -> Vec<Capability> {
        let filter = ManifestObjectFilter::new()
            .by_type(intent_type)
            .by_qualifier(qualifier.clone());
        self.capabilities
            .find(&filter, matches_intent)
            .into_iter()
            .filter(|capability| self.is_visible(capability, requester))
            .cloned()
            .collect()
    }

    /// Visibility rule: public, owned by the requester, or scope check disabled.
    pub fn is_visible(&self, capability: &Capability, requester: &str) -> bool {
        !capability.is_private()
            || capability.app_symbolic_name() == requester
            || self.applications.is_scope_check_disabled(requester)
    }

    /// Get a capability by id.
    pub fn capability(&self, id: &str) -> Option<&Capability> {
        self.capabilities.get(id)
    }

    /// Get an intention by id.
    pub fn intention(&self, id: &str) -> Option<&Intention> {
        self.intentions.get(id)
    }

    /// Subscribe to changes of either store.
    pub fn subscribe_changes(&self) -> ManifestChanges {
        ManifestChanges {
            capabilities: self.capabilities.subscribe(),
            intentions: self.intentions.subscribe(),
        }
    }

    /// The application directory used for access decisions.
    pub fn applications(&self) -> &ApplicationRegistry {
        &self.applications
    }
}

/// Change signal over both manifest stores.
pub struct ManifestChanges {
    capabilities: watch::Receiver<()>,
    intentions: watch::Receiver<()>,
}

impl ManifestChanges {
    /// Whether either store changed since the last call; marks both as seen.
    pub fn take_changed(&mut self) -> bool {
        let capabilities = self.capabilities.has_changed().unwrap_or(false);
        let intentions = self.intentions.has_changed().unwrap_or(false);
        self.capabilities.borrow_and_update();
        self.intentions.borrow_and_update();
        capabilities || intentions
    }

    /// Wait until either store changes.
    pub async fn changed(&mut self) -> Result<()> {
        tokio::select! {
            res = self.capabilities.changed() => res,
            res = self.intentions.changed() => res,
        }
        .map_err(|_| Error::Internal("manifest registry dropped".into()))
    }
}

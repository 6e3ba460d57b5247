//! Manifest control topics.
//!
//! Serves registration and lookup requests published on the reserved
//! `ɵmanifest/...` topics. Lookups stay live: after the seed reply, the
//! requester gets a new reply whenever a manifest change alters its result.
//! Every request is answered on its own; a failing request is reported to
//! its requester only.

use crate::broker::topics;
use crate::core::{Error, Result};
use crate::manifest::{
    CapabilityDescriptor, IntentionDescriptor, ManifestChanges, ManifestObject, ManifestObjectFilter,
    ManifestRegistry,
};
use crate::transport::TopicMessage;
use serde_json::Value;
use tracing::{debug, warn};

/// What a live lookup queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LookupKind {
    Capabilities,
    Intentions,
}

/// A standing lookup request.
#[derive(Clone, Debug)]
struct LiveLookup {
    requester: String,
    reply_to: String,
    kind: LookupKind,
    filter: ManifestObjectFilter,
    /// Ids of the last reported result
    last_ids: Vec<String>,
}

/// Broker-side manifest request handler.
pub struct ManifestService {
    registry: ManifestRegistry,
    changes: ManifestChanges,
    lookups: Vec<LiveLookup>,
}

impl ManifestService {
    /// Serve requests against `registry`.
    pub fn new(registry: ManifestRegistry) -> Self {
        let changes = registry.subscribe_changes();
        Self {
            registry,
            changes,
            lookups: Vec::new(),
        }
    }

    /// Whether the topic is a manifest request topic.
    pub fn handles(topic: &str) -> bool {
        matches!(
            topic,
            topics::LOOKUP_CAPABILITIES
                | topics::REGISTER_CAPABILITY
                | topics::UNREGISTER_CAPABILITIES
                | topics::LOOKUP_INTENTIONS
                | topics::REGISTER_INTENTION
                | topics::UNREGISTER_INTENTIONS
        )
    }

    /// Handle a request from `app`, returning the replies to deliver.
    pub fn handle_request(&mut self, app: &str, request: &TopicMessage, reply_to: &str) -> Vec<TopicMessage> {
        let outcome = match request.topic.as_str() {
            topics::REGISTER_CAPABILITY => request
                .body_as::<CapabilityDescriptor>()
                .map_err(|e| Error::CapabilityRegister(e.to_string()))
                .and_then(|descriptor| self.registry.register_capability(app, descriptor))
                .map(Value::from),
            topics::UNREGISTER_CAPABILITIES => request
                .body_as::<Option<ManifestObjectFilter>>()
                .map_err(|e| Error::CapabilityRegister(e.to_string()))
                .and_then(|filter| self.registry.unregister_capabilities(app, filter.unwrap_or_default()))
                .map(Value::from),
            topics::REGISTER_INTENTION => request
                .body_as::<IntentionDescriptor>()
                .map_err(|e| Error::IntentionRegister(e.to_string()))
                .and_then(|descriptor| self.registry.register_intention(app, descriptor))
                .map(Value::from),
            topics::UNREGISTER_INTENTIONS => request
                .body_as::<Option<ManifestObjectFilter>>()
                .map_err(|e| Error::IntentionRegister(e.to_string()))
                .and_then(|filter| self.registry.unregister_intentions(app, filter.unwrap_or_default()))
                .map(Value::from),
            topics::LOOKUP_CAPABILITIES => {
                return self.start_lookup(app, request, reply_to, LookupKind::Capabilities);
            }
            topics::LOOKUP_INTENTIONS => {
                return self.start_lookup(app, request, reply_to, LookupKind::Intentions);
            }
            other => Err(Error::Topic(format!("'{}' is not a manifest topic", other))),
        };

        match outcome {
            Ok(body) => vec![TopicMessage::reply(reply_to, body)],
            Err(e) => {
                warn!(app = %app, topic = %request.topic, error = %e, "manifest request failed");
                vec![TopicMessage::error_reply(reply_to, &e)]
            }
        }
    }

    fn start_lookup(&mut self, app: &str, request: &TopicMessage, reply_to: &str, kind: LookupKind) -> Vec<TopicMessage> {
        let filter = match request.body_as::<Option<ManifestObjectFilter>>() {
            Ok(filter) => filter.unwrap_or_default(),
            Err(e) => {
                warn!(app = %app, topic = %request.topic, error = %e, "malformed lookup request");
                return vec![TopicMessage::error_reply(reply_to, &e)];
            }
        };

        let mut lookup = LiveLookup {
            requester: app.to_string(),
            reply_to: reply_to.to_string(),
            kind,
            filter,
            last_ids: Vec::new(),
        };
        let reply = match self.evaluate(&lookup) {
            Ok((ids, body)) => {
                lookup.last_ids = ids;
                TopicMessage::reply(reply_to, body)
            }
            Err(e) => {
                warn!(app = %app, error = %e, "lookup failed");
                return vec![TopicMessage::error_reply(reply_to, &e)];
            }
        };
        debug!(app = %app, reply_to = %reply_to, ?kind, "live lookup started");
        self.lookups.push(lookup);
        vec![reply]
    }

    /// Run a lookup, returning the result ids and the serialized result.
    fn evaluate(&self, lookup: &LiveLookup) -> Result<(Vec<String>, Value)> {
        match lookup.kind {
            LookupKind::Capabilities => {
                let found = self.registry.lookup_capabilities(&lookup.requester, &lookup.filter);
                let ids = found.iter().map(|c| c.id().to_string()).collect();
                Ok((ids, serde_json::to_value(found)?))
            }
            LookupKind::Intentions => {
                let found = self.registry.lookup_intentions(&lookup.filter);
                let ids = found.iter().map(|i| i.id().to_string()).collect();
                Ok((ids, serde_json::to_value(found)?))
            }
        }
    }

    /// Drop lookups whose reply topic nobody listens to any more.
    pub fn prune(&mut self, is_listened: impl Fn(&str) -> bool) {
        let before = self.lookups.len();
        self.lookups.retain(|lookup| is_listened(&lookup.reply_to));
        if self.lookups.len() < before {
            debug!(dropped = before - self.lookups.len(), "live lookups ended");
        }
    }

    /// Re-run live lookups after a manifest change, returning the replies
    /// whose result changed.
    pub fn refresh(&mut self) -> Vec<TopicMessage> {
        if !self.changes.take_changed() {
            return Vec::new();
        }

        let mut replies = Vec::new();
        for index in 0..self.lookups.len() {
            let lookup = &self.lookups[index];
            let reply_to = lookup.reply_to.clone();
            match self.evaluate(lookup) {
                Ok((ids, body)) => {
                    if ids != self.lookups[index].last_ids {
                        self.lookups[index].last_ids = ids;
                        replies.push(TopicMessage::reply(&reply_to, body));
                    }
                }
                Err(e) => {
                    warn!(reply_to = %reply_to, error = %e, "lookup refresh failed");
                    replies.push(TopicMessage::error_reply(&reply_to, &e));
                }
            }
        }
        replies
    }

    /// Number of live lookups.
    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }

    /// The manifest registry.
    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ApplicationRegistry;
    use crate::core::ApplicationConfig;
    use crate::manifest::Capability;
    use crate::qualifier::Qualifier;
    use crate::transport::{headers, REPLY_ERROR, REPLY_OK};
    use std::sync::Arc;

    fn service() -> ManifestService {
        let apps = ApplicationRegistry::from_config(&[
            ApplicationConfig::new("app-a", "https://a.example"),
            ApplicationConfig::new("app-b", "https://b.example"),
        ]);
        ManifestService::new(ManifestRegistry::new(Arc::new(apps)))
    }

    fn request(topic: &str, body: Value) -> TopicMessage {
        TopicMessage::new(topic).with_body(body).with_reply_to("ɵreply/1")
    }

    #[test]
    fn test_register_and_unregister_capability() {
        let mut service = service();
        let descriptor = serde_json::to_value(CapabilityDescriptor::new("view").public()).unwrap();

        let replies = service.handle_request("app-a", &request(topics::REGISTER_CAPABILITY, descriptor), "ɵreply/1");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].header_str(headers::STATUS), Some(REPLY_OK));
        let id: String = replies[0].body_as().unwrap();

        let filter = serde_json::to_value(ManifestObjectFilter::new().by_id(&id)).unwrap();
        let replies = service.handle_request("app-a", &request(topics::UNREGISTER_CAPABILITIES, filter), "ɵreply/1");
        let removed: Vec<String> = replies[0].body_as().unwrap();
        assert_eq!(removed, vec![id]);
    }

    #[test]
    fn test_failures_reported_per_request() {
        let mut service = service();
        let descriptor = serde_json::to_value(
            CapabilityDescriptor::new("view").with_qualifier(Qualifier::any()),
        )
        .unwrap();
        let replies = service.handle_request("app-a", &request(topics::REGISTER_CAPABILITY, descriptor), "ɵreply/1");
        assert_eq!(replies[0].header_str(headers::STATUS), Some(REPLY_ERROR));
        assert!(matches!(replies[0].clone().into_reply(), Err(Error::CapabilityRegister(_))));

        // Intention registration is disabled by default
        let descriptor = serde_json::to_value(IntentionDescriptor::new("view")).unwrap();
        let replies = service.handle_request("app-a", &request(topics::REGISTER_INTENTION, descriptor), "ɵreply/1");
        assert!(matches!(replies[0].clone().into_reply(), Err(Error::IntentionRegister(_))));
    }

    #[test]
    fn test_live_lookup_reports_changes() {
        let mut service = service();
        let lookup = request(topics::LOOKUP_CAPABILITIES, serde_json::json!({"type": "view"}));
        let replies = service.handle_request("app-b", &lookup, "ɵreply/1");
        let seed: Vec<Capability> = replies[0].body_as().unwrap();
        assert!(seed.is_empty());
        assert_eq!(service.lookup_count(), 1);

        let descriptor = serde_json::to_value(CapabilityDescriptor::new("view").public()).unwrap();
        service.handle_request("app-a", &request(topics::REGISTER_CAPABILITY, descriptor), "ɵreply/2");

        let updates = service.refresh();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].topic, "ɵreply/1");
        let found: Vec<Capability> = updates[0].body_as().unwrap();
        assert_eq!(found.len(), 1);

        // Private capabilities of other apps do not change app-b's result
        let descriptor = serde_json::to_value(
            CapabilityDescriptor::new("view").with_qualifier(Qualifier::empty().with("entity", "person")),
        )
        .unwrap();
        service.handle_request("app-a", &request(topics::REGISTER_CAPABILITY, descriptor), "ɵreply/2");
        assert!(service.refresh().is_empty());

        service.prune(|_| false);
        assert_eq!(service.lookup_count(), 0);
    }

    #[test]
    fn test_lookup_without_body_matches_everything() {
        let mut service = service();
        let descriptor = serde_json::to_value(CapabilityDescriptor::new("view")).unwrap();
        service.handle_request("app-a", &request(topics::REGISTER_CAPABILITY, descriptor), "ɵreply/1");

        let lookup = TopicMessage::new(topics::LOOKUP_INTENTIONS).with_reply_to("ɵreply/2");
        let replies = service.handle_request("app-a", &lookup, "ɵreply/2");
        let found: Vec<Value> = replies[0].body_as().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["implicit"], true);
    }
}

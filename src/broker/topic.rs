//! Topic routing.
//!
//! Topics are `/`-separated segments. A segment starting with `:` is a named
//! wildcard and may only appear in subscription patterns. The router keeps
//! subscriptions per pattern, retained messages per topic, and the watchers
//! interested in subscriber counts.

use crate::core::{Error, Result, TransportHandle};
use crate::transport::TopicMessage;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Prefix marking a wildcard segment.
const WILDCARD_SEGMENT_PREFIX: char = ':';

/// Validate a topic. Patterns are only accepted when `allow_patterns` is set.
pub fn validate_topic(topic: &str, allow_patterns: bool) -> Result<()> {
    if topic.is_empty() {
        return Err(Error::Topic("topic is required".into()));
    }
    for segment in topic.split('/') {
        if segment.is_empty() {
            return Err(Error::Topic(format!("'{}' contains an empty segment", topic)));
        }
        if let Some(name) = segment.strip_prefix(WILDCARD_SEGMENT_PREFIX) {
            if !allow_patterns {
                return Err(Error::Topic(format!(
                    "'{}' must be concrete, wildcard segments are only allowed when subscribing",
                    topic
                )));
            }
            if name.is_empty() {
                return Err(Error::Topic(format!("'{}' has an unnamed wildcard segment", topic)));
            }
        }
    }
    Ok(())
}

/// Whether the topic contains wildcard segments.
pub fn is_pattern(topic: &str) -> bool {
    topic
        .split('/')
        .any(|segment| segment.starts_with(WILDCARD_SEGMENT_PREFIX))
}

/// Match a concrete topic against a pattern, returning the bound parameters.
pub fn match_topic(pattern: &str, topic: &str) -> Option<BTreeMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let topic_segments: Vec<&str> = topic.split('/').collect();
    if pattern_segments.len() != topic_segments.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (expected, actual) in pattern_segments.iter().zip(topic_segments.iter()) {
        match expected.strip_prefix(WILDCARD_SEGMENT_PREFIX) {
            Some(name) => {
                params.insert(name.to_string(), actual.to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}

/// A subscriber of a topic pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscriber {
    /// Subscriber id chosen by the context
    pub subscriber_id: String,
    /// Owning connection
    pub handle: TransportHandle,
}

/// Where a published message must go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicRoute {
    /// Receiving subscriber
    pub subscriber: Subscriber,
    /// Parameters bound by the subscriber's pattern
    pub params: BTreeMap<String, String>,
}

/// A standing request for the subscriber count of a topic.
#[derive(Clone, Debug)]
struct CountWatcher {
    watched: String,
    reply_to: String,
    last: Option<usize>,
}

/// Publish/subscribe fan-out table.
#[derive(Debug, Default)]
pub struct TopicRouter {
    /// Subscribers by topic pattern
    subscriptions: HashMap<String, Vec<Subscriber>>,
    /// Retained message by topic
    retained: HashMap<String, TopicMessage>,
    /// Subscriber count watchers
    watchers: Vec<CountWatcher>,
}

impl TopicRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Adding the same subscriber twice is a no-op.
    ///
    /// Returns the routes of retained messages the new subscriber must receive.
    pub fn subscribe(&mut self, topic: &str, subscriber_id: &str, handle: TransportHandle) -> Result<Vec<(TopicMessage, TopicRoute)>> {
        validate_topic(topic, true)?;
        if subscriber_id.is_empty() {
            return Err(Error::Topic("subscriber id is required".into()));
        }

        let subscriber = Subscriber {
            subscriber_id: subscriber_id.to_string(),
            handle,
        };
        let subscribers = self.subscriptions.entry(topic.to_string()).or_default();
        if !subscribers.contains(&subscriber) {
            subscribers.push(subscriber.clone());
            debug!(topic = %topic, subscriber = %subscriber_id, %handle, "subscribed");
        }

        let mut retained: Vec<(TopicMessage, TopicRoute)> = self
            .retained
            .values()
            .filter_map(|message| {
                match_topic(topic, &message.topic).map(|params| {
                    (
                        message.clone(),
                        TopicRoute {
                            subscriber: subscriber.clone(),
                            params,
                        },
                    )
                })
            })
            .collect();
        retained.sort_by(|a, b| a.0.topic.cmp(&b.0.topic));
        Ok(retained)
    }

    /// Remove a subscription. Returns its topic pattern if it existed.
    pub fn unsubscribe(&mut self, subscriber_id: &str, handle: TransportHandle) -> Option<String> {
        let topic = self.subscriptions.iter().find_map(|(topic, subscribers)| {
            subscribers
                .iter()
                .any(|s| s.subscriber_id == subscriber_id && s.handle == handle)
                .then(|| topic.clone())
        })?;

        if let Some(subscribers) = self.subscriptions.get_mut(&topic) {
            subscribers.retain(|s| !(s.subscriber_id == subscriber_id && s.handle == handle));
            if subscribers.is_empty() {
                self.subscriptions.remove(&topic);
            }
        }
        debug!(topic = %topic, subscriber = %subscriber_id, %handle, "unsubscribed");
        Some(topic)
    }

    /// Remove every subscription of a connection. Returns how many were removed.
    pub fn remove_connection(&mut self, handle: TransportHandle) -> usize {
        let mut removed = 0;
        self.subscriptions.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.handle != handle);
            removed += before - subscribers.len();
            !subscribers.is_empty()
        });
        if removed > 0 {
            debug!(%handle, removed, "subscriptions of connection removed");
        }
        removed
    }

    /// Snapshot the routes for a concrete topic.
    pub fn resolve(&self, topic: &str) -> Vec<TopicRoute> {
        let mut routes: Vec<TopicRoute> = self
            .subscriptions
            .iter()
            .filter_map(|(pattern, subscribers)| match_topic(pattern, topic).map(|params| (params, subscribers)))
            .flat_map(|(params, subscribers)| {
                subscribers.iter().map(move |subscriber| TopicRoute {
                    subscriber: subscriber.clone(),
                    params: params.clone(),
                })
            })
            .collect();
        // Deterministic order across patterns
        routes.sort_by(|a, b| a.subscriber.handle.cmp(&b.subscriber.handle));
        trace!(topic = %topic, routes = routes.len(), "topic resolved");
        routes
    }

    /// Number of subscriptions receiving messages published to `topic`.
    ///
    /// For a pattern, counts the subscriptions on exactly that pattern.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        if is_pattern(topic) {
            return self.subscriptions.get(topic).map(Vec::len).unwrap_or(0);
        }
        self.subscriptions
            .iter()
            .filter(|(pattern, _)| match_topic(pattern, topic).is_some())
            .map(|(_, subscribers)| subscribers.len())
            .sum()
    }

    /// Store or clear the retained message of the message's topic.
    ///
    /// A retained message without body clears the slot.
    pub fn retain(&mut self, message: &TopicMessage) {
        if message.body.is_none() {
            self.retained.remove(&message.topic);
            debug!(topic = %message.topic, "retained message cleared");
        } else {
            let mut retained = message.clone();
            retained.reply_to = None;
            self.retained.insert(message.topic.clone(), retained);
            debug!(topic = %message.topic, "message retained");
        }
    }

    /// Get the retained message of a topic.
    pub fn retained(&self, topic: &str) -> Option<&TopicMessage> {
        self.retained.get(topic)
    }

    /// Start reporting the subscriber count of `watched` to `reply_to`.
    pub fn watch_count(&mut self, watched: &str, reply_to: &str) -> Result<()> {
        validate_topic(watched, true)?;
        self.watchers.push(CountWatcher {
            watched: watched.to_string(),
            reply_to: reply_to.to_string(),
            last: None,
        });
        Ok(())
    }

    /// Drop watchers nobody listens to any more, then collect the count
    /// replies that changed since they were last reported.
    pub fn count_updates(&mut self) -> Vec<TopicMessage> {
        let listening: Vec<bool> = self
            .watchers
            .iter()
            .map(|w| self.subscriber_count(&w.reply_to) > 0)
            .collect();
        let mut listening = listening.into_iter();
        self.watchers.retain(|_| listening.next().unwrap_or(false));

        let counts: Vec<usize> = self
            .watchers
            .iter()
            .map(|w| self.subscriber_count(&w.watched))
            .collect();

        self.watchers
            .iter_mut()
            .zip(counts)
            .filter(|(watcher, count)| watcher.last != Some(*count))
            .map(|(watcher, count)| {
                watcher.last = Some(count);
                TopicMessage::reply(&watcher.reply_to, count)
            })
            .collect()
    }

    /// Number of active count watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: TransportHandle = TransportHandle(1);
    const B: TransportHandle = TransportHandle(2);

    #[test]
    fn test_validate_topic() {
        assert!(validate_topic("news", false).is_ok());
        assert!(validate_topic("person/42", false).is_ok());
        assert!(matches!(validate_topic("", true), Err(Error::Topic(_))));
        assert!(matches!(validate_topic("a//b", true), Err(Error::Topic(_))));
        assert!(matches!(validate_topic("person/:id", false), Err(Error::Topic(_))));
        assert!(validate_topic("person/:id", true).is_ok());
        assert!(matches!(validate_topic("person/:", true), Err(Error::Topic(_))));
    }

    #[test]
    fn test_match_topic_binds_params() {
        let params = match_topic("person/:id/:view", "person/42/detail").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert_eq!(params.get("view").map(String::as_str), Some("detail"));
        assert!(match_topic("person/:id", "person/42/detail").is_none());
        assert!(match_topic("person/:id", "company/42").is_none());
        assert!(match_topic("news", "news").unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut router = TopicRouter::new();
        router.subscribe("news", "s1", A).unwrap();
        router.subscribe("news", "s1", A).unwrap();
        router.subscribe("news", "s1", B).unwrap();
        assert_eq!(router.subscriber_count("news"), 2);
    }

    #[test]
    fn test_unsubscribe_drops_empty_topic() {
        let mut router = TopicRouter::new();
        router.subscribe("news", "s1", A).unwrap();
        assert_eq!(router.unsubscribe("s1", A).as_deref(), Some("news"));
        assert_eq!(router.subscriber_count("news"), 0);
        assert!(router.subscriptions.is_empty());
        assert!(router.unsubscribe("s1", A).is_none());
    }

    #[test]
    fn test_resolve_across_patterns() {
        let mut router = TopicRouter::new();
        router.subscribe("person/42", "exact", A).unwrap();
        router.subscribe("person/:id", "pattern", B).unwrap();
        router.subscribe("company/:id", "other", B).unwrap();

        let routes = router.resolve("person/42");
        assert_eq!(routes.len(), 2);
        let pattern_route = routes.iter().find(|r| r.subscriber.subscriber_id == "pattern").unwrap();
        assert_eq!(pattern_route.params.get("id").map(String::as_str), Some("42"));
        assert_eq!(router.subscriber_count("person/42"), 2);
        assert_eq!(router.subscriber_count("person/:id"), 1);
    }

    #[test]
    fn test_remove_connection_cascades() {
        let mut router = TopicRouter::new();
        router.subscribe("news", "s1", A).unwrap();
        router.subscribe("weather", "s2", A).unwrap();
        router.subscribe("news", "s3", B).unwrap();
        assert_eq!(router.remove_connection(A), 2);
        assert_eq!(router.subscriber_count("news"), 1);
        assert_eq!(router.subscriber_count("weather"), 0);
    }

    #[test]
    fn test_retained_message_delivered_on_subscribe() {
        let mut router = TopicRouter::new();
        router.retain(&TopicMessage::new("status/host").with_body("ready").retained());

        let retained = router.subscribe("status/:app", "s1", A).unwrap();
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].0.body, Some("ready".into()));
        assert_eq!(retained[0].1.params.get("app").map(String::as_str), Some("host"));

        router.retain(&TopicMessage::new("status/host").retained());
        assert!(router.retained("status/host").is_none());
        assert!(router.subscribe("status/:app", "s2", A).unwrap().is_empty());
    }

    #[test]
    fn test_count_watcher_lifecycle() {
        let mut router = TopicRouter::new();
        router.subscribe("reply/1", "watcher", A).unwrap();
        router.watch_count("news", "reply/1").unwrap();

        let updates = router.count_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].topic, "reply/1");
        assert_eq!(updates[0].body, Some(0.into()));

        // Unchanged count is not re-reported
        assert!(router.count_updates().is_empty());

        router.subscribe("news", "s1", B).unwrap();
        let updates = router.count_updates();
        assert_eq!(updates[0].body, Some(1.into()));

        router.unsubscribe("watcher", A);
        assert!(router.count_updates().is_empty());
        assert_eq!(router.watcher_count(), 0);
    }
}

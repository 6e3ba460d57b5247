//! Subscription handles.
//!
//! Every handle is a [`Stream`] that never ends on its own. Dropping a topic
//! subscription unsubscribes it; [`Subscription::unsubscribe`] does the same
//! and waits for the broker's acknowledgement. Either way the unsubscribe
//! frame is sent exactly once and its failure is ignored.

use crate::client::message_client::ClientInner;
use crate::core::Result;
use crate::qualifier::{matches_intent, Qualifier};
use crate::transport::{IntentMessage, TopicMessage};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Messages delivered to one topic subscription.
pub struct Subscription {
    client: Arc<ClientInner>,
    topic: String,
    subscriber_id: String,
    rx: mpsc::UnboundedReceiver<TopicMessage>,
    released: bool,
}

impl Subscription {
    pub(crate) fn new(
        client: Arc<ClientInner>,
        topic: &str,
        subscriber_id: &str,
        rx: mpsc::UnboundedReceiver<TopicMessage>,
    ) -> Self {
        Self {
            client,
            topic: topic.to_string(),
            subscriber_id: subscriber_id.to_string(),
            rx,
            released: false,
        }
    }

    /// Subscribed topic or pattern.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscriber id announced to the broker.
    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Unsubscribe and wait for the broker to acknowledge.
    pub async fn unsubscribe(mut self) {
        self.released = true;
        self.client.release_subscription(&self.subscriber_id).await;
    }
}

impl Stream for Subscription {
    type Item = TopicMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.client.release_subscription_detached(&self.subscriber_id);
        }
    }
}

/// Replies to a request.
///
/// Yields each reply, or the typed error carried by an error reply, after
/// which the stream ends.
pub struct ReplyStream {
    subscription: Subscription,
    done: bool,
}

impl ReplyStream {
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            done: false,
        }
    }

    /// Reply topic the replies arrive on.
    pub fn reply_to(&self) -> &str {
        self.subscription.topic()
    }

    /// Next reply, with its body deserialized.
    pub async fn next_as<T: DeserializeOwned>(&mut self) -> Option<Result<T>> {
        self.next()
            .await
            .map(|reply| reply.and_then(|message| message.body_as()))
    }

    /// Stop receiving replies.
    pub async fn close(self) {
        self.subscription.unsubscribe().await;
    }
}

impl Stream for ReplyStream {
    type Item = Result<TopicMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.subscription).poll_next(cx) {
            Poll::Ready(Some(message)) => {
                let reply = message.into_reply();
                this.done = reply.is_err();
                Poll::Ready(Some(reply))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Which intents an intent handler receives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntentSelector {
    /// Required intent type
    pub intent_type: Option<String>,
    /// Qualifier pattern the intent's qualifier must satisfy
    pub qualifier: Option<Qualifier>,
}

impl IntentSelector {
    /// Select every intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an intent type.
    pub fn of_type(mut self, intent_type: &str) -> Self {
        self.intent_type = Some(intent_type.to_string());
        self
    }

    /// Require the intent's qualifier to satisfy `qualifier`.
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    /// Whether the intent is selected.
    pub fn matches(&self, intent: &IntentMessage) -> bool {
        if let Some(intent_type) = &self.intent_type {
            if *intent_type != intent.intent_type {
                return false;
            }
        }
        match &self.qualifier {
            Some(pattern) => matches_intent(Some(pattern), intent.qualifier.as_ref()),
            None => true,
        }
    }
}

/// Intents delivered to one intent handler.
pub struct IntentSubscription {
    client: Arc<ClientInner>,
    sink_id: String,
    rx: mpsc::UnboundedReceiver<IntentMessage>,
}

impl IntentSubscription {
    pub(crate) fn new(client: Arc<ClientInner>, sink_id: &str, rx: mpsc::UnboundedReceiver<IntentMessage>) -> Self {
        Self {
            client,
            sink_id: sink_id.to_string(),
            rx,
        }
    }
}

impl Stream for IntentSubscription {
    type Item = IntentMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for IntentSubscription {
    fn drop(&mut self) {
        self.client.release_intent_sink(&self.sink_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_by_type_and_qualifier() {
        let person = IntentMessage::new("view").with_qualifier(Qualifier::empty().with("entity", "person"));
        let bare = IntentMessage::new("view");

        assert!(IntentSelector::new().matches(&person));
        assert!(IntentSelector::new().of_type("view").matches(&bare));
        assert!(!IntentSelector::new().of_type("edit").matches(&person));

        let selector = IntentSelector::new().with_qualifier(Qualifier::empty().with("entity", "*"));
        assert!(selector.matches(&person));
        assert!(!selector.matches(&bare));

        let selector = IntentSelector::new().with_qualifier(Qualifier::any());
        assert!(selector.matches(&person));
    }
}

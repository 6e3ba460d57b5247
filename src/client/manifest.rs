//! Manifest access over the reserved manifest topics.
//!
//! Registration calls and one-shot lookups wait for a single reply, bounded
//! by the delivery timeout. Observed lookups stay open and yield the result
//! again whenever it changes.

use crate::broker::topics;
use crate::client::message_client::ClientInner;
use crate::client::subscription::ReplyStream;
use crate::core::{Error, Result};
use crate::manifest::{Capability, CapabilityDescriptor, Intention, IntentionDescriptor, ManifestObjectFilter};
use crate::transport::{Envelope, TopicMessage};
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Manifest operations of one context.
#[derive(Clone)]
pub struct ManifestClient {
    client: Arc<ClientInner>,
}

impl ManifestClient {
    pub(crate) fn new(client: Arc<ClientInner>) -> Self {
        Self { client }
    }

    async fn open(&self, topic: &'static str, body: Value) -> Result<ReplyStream> {
        self.client
            .request(false, move |reply_to| {
                Envelope::publish(TopicMessage::new(topic).with_body(body).with_reply_to(reply_to))
            })
            .await
    }

    async fn call<T: DeserializeOwned>(&self, topic: &'static str, body: Value) -> Result<T> {
        let mut replies = self.open(topic, body).await?;
        let timeout = self.client.delivery_timeout();
        let reply = tokio::time::timeout(timeout, replies.next_as::<T>()).await;
        replies.close().await;
        match reply {
            Ok(Some(result)) => result,
            Ok(None) => Err(Error::MessageDispatch(format!("'{}' closed without reply", topic))),
            Err(_) => Err(Error::MessageDispatch(format!(
                "no reply from '{}' within {:?}",
                topic, timeout
            ))),
        }
    }

    /// Register a capability of this context's application. Returns its id.
    pub async fn register_capability(&self, descriptor: CapabilityDescriptor) -> Result<String> {
        self.call(topics::REGISTER_CAPABILITY, serde_json::to_value(descriptor)?)
            .await
    }

    /// Remove the application's capabilities equal to the filter. Returns the
    /// removed ids.
    pub async fn unregister_capabilities(&self, filter: ManifestObjectFilter) -> Result<Vec<String>> {
        self.call(topics::UNREGISTER_CAPABILITIES, serde_json::to_value(filter)?)
            .await
    }

    /// Register an intention of this context's application. Returns its id.
    pub async fn register_intention(&self, descriptor: IntentionDescriptor) -> Result<String> {
        self.call(topics::REGISTER_INTENTION, serde_json::to_value(descriptor)?)
            .await
    }

    /// Remove the application's intentions equal to the filter. Returns the
    /// removed ids.
    pub async fn unregister_intentions(&self, filter: ManifestObjectFilter) -> Result<Vec<String>> {
        self.call(topics::UNREGISTER_INTENTIONS, serde_json::to_value(filter)?)
            .await
    }

    /// Capabilities visible to this application that match the filter.
    pub async fn lookup_capabilities(&self, filter: ManifestObjectFilter) -> Result<Vec<Capability>> {
        self.call(topics::LOOKUP_CAPABILITIES, serde_json::to_value(filter)?)
            .await
    }

    /// Intentions matching the filter.
    pub async fn lookup_intentions(&self, filter: ManifestObjectFilter) -> Result<Vec<Intention>> {
        self.call(topics::LOOKUP_INTENTIONS, serde_json::to_value(filter)?)
            .await
    }

    /// Observe the capabilities visible to this application that match the filter.
    pub async fn observe_capabilities(&self, filter: ManifestObjectFilter) -> Result<ManifestLookup<Capability>> {
        let replies = self
            .open(topics::LOOKUP_CAPABILITIES, serde_json::to_value(filter)?)
            .await?;
        Ok(ManifestLookup::new(replies))
    }

    /// Observe the intentions matching the filter.
    pub async fn observe_intentions(&self, filter: ManifestObjectFilter) -> Result<ManifestLookup<Intention>> {
        let replies = self
            .open(topics::LOOKUP_INTENTIONS, serde_json::to_value(filter)?)
            .await?;
        Ok(ManifestLookup::new(replies))
    }
}

/// Live lookup result.
pub struct ManifestLookup<T> {
    replies: ReplyStream,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ManifestLookup<T> {
    fn new(replies: ReplyStream) -> Self {
        Self {
            replies,
            _marker: PhantomData,
        }
    }

    /// Stop observing.
    pub async fn close(self) {
        self.replies.close().await;
    }
}

impl<T: DeserializeOwned> Stream for ManifestLookup<T> {
    type Item = Result<Vec<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.replies)
            .poll_next(cx)
            .map(|reply| reply.map(|reply| reply.and_then(|message| message.body_as())))
    }
}

//! Per-context message client.
//!
//! Wraps a context's transport with the broker operations: publish and
//! observe, request/reply, issuing and handling intents. Every frame sent to
//! the broker waits for its delivery acknowledgement, bounded by the
//! configured delivery timeout.

use crate::broker::topics;
use crate::broker::{validate_topic, ContextEndpoint};
use crate::client::manifest::ManifestClient;
use crate::client::routing::{run_dispatcher, Routing};
use crate::client::subscription::{IntentSelector, IntentSubscription, ReplyStream, Subscription};
use crate::core::{random_id, ClientConfig, Error, Result, TransportHandle};
use crate::transport::{Envelope, IntentMessage, TopicMessage, Transport};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// State shared by a client and its subscription handles.
pub(crate) struct ClientInner {
    app_symbolic_name: String,
    handle: TransportHandle,
    outbound: Arc<dyn Transport>,
    routing: Arc<Routing>,
    config: ClientConfig,
    dispatcher: JoinHandle<()>,
}

impl ClientInner {
    /// Send a frame and wait for its acknowledgement.
    pub(crate) async fn deliver(&self, envelope: Envelope) -> Result<()> {
        let message_id = envelope.message_id.clone();
        let ack = self.routing.expect_ack(&message_id);
        if let Err(e) = self.outbound.send(envelope.clone()) {
            self.routing.cancel_ack(&message_id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.delivery_timeout, ack).await {
            Ok(Ok(status)) => status.into_result(),
            Ok(Err(_)) => Err(Error::MessageDispatch(format!(
                "broker went away before acknowledging {:?}",
                envelope
            ))),
            Err(_) => {
                self.routing.cancel_ack(&message_id);
                Err(Error::MessageDispatch(format!(
                    "no acknowledgement within {:?} for {:?}",
                    self.config.delivery_timeout, envelope
                )))
            }
        }
    }

    /// Wait until the host signalled startup completion, if configured to.
    async fn await_startup(&self) -> Result<()> {
        if !self.config.await_startup {
            return Ok(());
        }
        let mut startup = self.routing.startup();
        let started = *startup.borrow();
        if !started {
            debug!(app = %self.app_symbolic_name, "request held until host startup completes");
        }
        let outcome = match tokio::time::timeout(self.config.startup_timeout, startup.wait_for(|started| *started)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::MessageDispatch("client routing closed while awaiting startup".into())),
            Err(_) => Err(Error::MessageDispatch(format!(
                "host did not complete startup within {:?}",
                self.config.startup_timeout
            ))),
        };
        outcome
    }

    async fn subscribe(self: &Arc<Self>, topic: &str) -> Result<Subscription> {
        let subscriber_id = random_id();
        let (tx, rx) = mpsc::unbounded_channel();
        // Registered first: retained messages may arrive before the ack
        self.routing.add_subscriber(&subscriber_id, tx);
        let subscription = Subscription::new(self.clone(), topic, &subscriber_id, rx);
        self.deliver(Envelope::subscribe(topic, &subscriber_id)).await?;
        debug!(topic = %topic, subscriber = %subscriber_id, "subscribed");
        Ok(subscription)
    }

    /// Subscribe to a fresh reply topic, then send the request built for it.
    pub(crate) async fn request(
        self: &Arc<Self>,
        gated: bool,
        build: impl FnOnce(&str) -> Envelope,
    ) -> Result<ReplyStream> {
        if gated {
            self.await_startup().await?;
        }
        let reply_to = format!("{}{}", topics::REPLY_PREFIX, random_id());
        let subscription = self.subscribe(&reply_to).await?;
        self.deliver(build(&reply_to)).await?;
        Ok(ReplyStream::new(subscription))
    }

    pub(crate) async fn release_subscription(&self, subscriber_id: &str) {
        self.routing.remove_subscriber(subscriber_id);
        if let Err(e) = self.deliver(Envelope::unsubscribe(subscriber_id)).await {
            debug!(subscriber = %subscriber_id, error = %e, "unsubscribe not acknowledged");
        }
    }

    pub(crate) fn release_subscription_detached(&self, subscriber_id: &str) {
        self.routing.remove_subscriber(subscriber_id);
        if let Err(e) = self.outbound.send(Envelope::unsubscribe(subscriber_id)) {
            debug!(subscriber = %subscriber_id, error = %e, "unsubscribe not sent");
        }
    }

    pub(crate) fn release_intent_sink(&self, sink_id: &str) {
        self.routing.remove_intent_sink(sink_id);
    }

    pub(crate) fn delivery_timeout(&self) -> std::time::Duration {
        self.config.delivery_timeout
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Broker access for one execution context.
#[derive(Clone)]
pub struct MessageClient {
    inner: Arc<ClientInner>,
}

impl MessageClient {
    /// Connect a context as `app_symbolic_name` over `endpoint`.
    pub async fn connect(endpoint: ContextEndpoint, app_symbolic_name: &str, config: ClientConfig) -> Result<Self> {
        let ContextEndpoint {
            handle,
            outbound,
            inbound,
        } = endpoint;
        let routing = Arc::new(Routing::new(!config.await_startup));
        let dispatcher = tokio::spawn(run_dispatcher(routing.clone(), inbound));
        let inner = Arc::new(ClientInner {
            app_symbolic_name: app_symbolic_name.to_string(),
            handle,
            outbound,
            routing,
            config,
            dispatcher,
        });

        inner.deliver(Envelope::connect(app_symbolic_name)).await?;
        if inner.config.await_startup {
            inner
                .deliver(Envelope::subscribe(topics::STARTUP_COMPLETED, &random_id()))
                .await?;
        }
        info!(app = %app_symbolic_name, %handle, "connected to broker");
        Ok(Self { inner })
    }

    /// Application this client connected as.
    pub fn app_symbolic_name(&self) -> &str {
        &self.inner.app_symbolic_name
    }

    /// Transport handle of this client.
    pub fn handle(&self) -> TransportHandle {
        self.inner.handle
    }

    /// Publish a message to a concrete topic.
    pub async fn publish(&self, message: TopicMessage) -> Result<()> {
        validate_topic(&message.topic, false)?;
        self.inner.deliver(Envelope::publish(message)).await
    }

    /// Send a request and receive the replies.
    ///
    /// Fails with [`Error::NoReplier`] if nobody observes the topic.
    pub async fn request(&self, message: TopicMessage) -> Result<ReplyStream> {
        validate_topic(&message.topic, false)?;
        self.inner
            .request(true, move |reply_to| Envelope::publish(message.with_reply_to(reply_to)))
            .await
    }

    /// Observe a topic or topic pattern.
    pub async fn observe(&self, topic: &str) -> Result<Subscription> {
        validate_topic(topic, true)?;
        self.inner.subscribe(topic).await
    }

    /// Reply to a request.
    pub async fn reply(&self, reply_to: &str, body: impl Into<Value>) -> Result<()> {
        self.publish(TopicMessage::reply(reply_to, body)).await
    }

    /// Report a failure to a requester.
    pub async fn reply_error(&self, reply_to: &str, error: &Error) -> Result<()> {
        self.publish(TopicMessage::error_reply(reply_to, error)).await
    }

    /// Issue an intent to the providers of matching capabilities.
    pub async fn issue_intent(&self, intent: IntentMessage) -> Result<()> {
        self.inner.deliver(Envelope::intent(intent)).await
    }

    /// Issue an intent and receive the replies.
    pub async fn request_by_intent(&self, intent: IntentMessage) -> Result<ReplyStream> {
        self.inner
            .request(true, move |reply_to| Envelope::intent(intent.with_reply_to(reply_to)))
            .await
    }

    /// Receive the intents addressed to this context that match `selector`.
    pub fn handle_intent(&self, selector: IntentSelector) -> IntentSubscription {
        let sink_id = random_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.routing.add_intent_sink(&sink_id, selector, tx);
        IntentSubscription::new(self.inner.clone(), &sink_id, rx)
    }

    /// Observe the number of subscribers of a topic.
    ///
    /// The first reply carries the current count; further replies follow
    /// every change.
    pub async fn subscriber_count(&self, topic: &str) -> Result<ReplyStream> {
        validate_topic(topic, true)?;
        let watched = topic.to_string();
        self.inner
            .request(false, move |reply_to| {
                Envelope::publish(
                    TopicMessage::new(topics::SUBSCRIBER_COUNT)
                        .with_body(watched)
                        .with_reply_to(reply_to),
                )
            })
            .await
    }

    /// Manifest registration and lookup.
    pub fn manifest(&self) -> ManifestClient {
        ManifestClient::new(self.inner.clone())
    }

    /// Disconnect from the broker. Subscriptions of this context end
    /// broker-side.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.deliver(Envelope::disconnect()).await?;
        info!(app = %self.inner.app_symbolic_name, "disconnected from broker");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::core::{ApplicationConfig, BrokerConfig};
    use futures::StreamExt;
    use std::time::Duration;

    const ORIGIN: &str = "https://a.example";

    fn config() -> ClientConfig {
        ClientConfig::default()
            .with_await_startup(false)
            .with_delivery_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_publish_and_observe() {
        let (broker, handle) = Broker::new(BrokerConfig::with_applications(vec![ApplicationConfig::new("app-a", ORIGIN)]));
        let _broker = broker.spawn();
        let client = MessageClient::connect(handle.attach(ORIGIN).unwrap(), "app-a", config())
            .await
            .unwrap();

        let mut news = client.observe("news").await.unwrap();
        client
            .publish(TopicMessage::new("news").with_body("hello"))
            .await
            .unwrap();
        let message = news.next().await.unwrap();
        assert_eq!(message.body, Some("hello".into()));
        news.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_client_side_topic_validation() {
        let (broker, handle) = Broker::new(BrokerConfig::with_applications(vec![ApplicationConfig::new("app-a", ORIGIN)]));
        let _broker = broker.spawn();
        let client = MessageClient::connect(handle.attach(ORIGIN).unwrap(), "app-a", config())
            .await
            .unwrap();

        assert!(matches!(client.publish(TopicMessage::new("")).await, Err(Error::Topic(_))));
        assert!(matches!(client.publish(TopicMessage::new("person/:id")).await, Err(Error::Topic(_))));
        assert!(client.observe("person/:id").await.is_ok());
    }

    #[tokio::test]
    async fn test_startup_wait_is_bounded() {
        let (broker, handle) = Broker::new(BrokerConfig::with_applications(vec![ApplicationConfig::new("app-a", ORIGIN)]));
        let _broker = broker.spawn();
        let config = config()
            .with_await_startup(true)
            .with_startup_timeout(Duration::from_millis(50));
        let client = MessageClient::connect(handle.attach(ORIGIN).unwrap(), "app-a", config)
            .await
            .unwrap();

        let err = client.request(TopicMessage::new("echo")).await.err().unwrap();
        match err {
            Error::MessageDispatch(message) => assert!(message.contains("startup")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ack_timeout_reports_envelope() {
        let (tx, _broker_rx) = mpsc::unbounded_channel();
        let handle = crate::broker::BrokerHandle::new(tx, ClientConfig::default());
        let endpoint = handle.attach(ORIGIN).unwrap();

        let config = ClientConfig::default().with_delivery_timeout(Duration::from_millis(20));
        let err = MessageClient::connect(endpoint, "app-a", config).await.err().unwrap();
        match err {
            Error::MessageDispatch(message) => assert!(message.contains("Connect")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}

//! Inbound frame routing on the context side.
//!
//! One dispatcher task per client reads the broker-to-context port and hands
//! each frame to whoever waits for it: acknowledgements to the pending
//! sender, topic deliveries to the local subscriber named in the
//! subscriber-id header, intents to every matching intent sink.

use crate::broker::topics;
use crate::client::subscription::IntentSelector;
use crate::transport::{headers, DeliveryStatus, Envelope, IntentMessage, Payload, TopicMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct IntentSink {
    selector: IntentSelector,
    tx: mpsc::UnboundedSender<IntentMessage>,
}

/// Routing tables shared by a client and its dispatcher task.
pub(crate) struct Routing {
    /// Acknowledgement waiters by message id
    pending: Mutex<HashMap<String, oneshot::Sender<DeliveryStatus>>>,
    /// Local subscribers by subscriber id
    subscribers: Mutex<HashMap<String, mpsc::UnboundedSender<TopicMessage>>>,
    /// Intent sinks by sink id
    intent_sinks: Mutex<HashMap<String, IntentSink>>,
    /// Whether the host signalled startup completion
    startup: watch::Sender<bool>,
}

impl Routing {
    pub(crate) fn new(started: bool) -> Self {
        let (startup, _) = watch::channel(started);
        Self {
            pending: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            intent_sinks: Mutex::new(HashMap::new()),
            startup,
        }
    }

    pub(crate) fn expect_ack(&self, message_id: &str) -> oneshot::Receiver<DeliveryStatus> {
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(message_id.to_string(), tx);
        rx
    }

    pub(crate) fn cancel_ack(&self, message_id: &str) {
        lock(&self.pending).remove(message_id);
    }

    pub(crate) fn add_subscriber(&self, subscriber_id: &str, tx: mpsc::UnboundedSender<TopicMessage>) {
        lock(&self.subscribers).insert(subscriber_id.to_string(), tx);
    }

    pub(crate) fn remove_subscriber(&self, subscriber_id: &str) {
        lock(&self.subscribers).remove(subscriber_id);
    }

    pub(crate) fn add_intent_sink(&self, sink_id: &str, selector: IntentSelector, tx: mpsc::UnboundedSender<IntentMessage>) {
        lock(&self.intent_sinks).insert(sink_id.to_string(), IntentSink { selector, tx });
    }

    pub(crate) fn remove_intent_sink(&self, sink_id: &str) {
        lock(&self.intent_sinks).remove(sink_id);
    }

    /// Receiver of the startup flag.
    pub(crate) fn startup(&self) -> watch::Receiver<bool> {
        self.startup.subscribe()
    }

    /// Route one inbound frame.
    pub(crate) fn route(&self, envelope: Envelope) {
        match envelope.message {
            Payload::Status(status) => match lock(&self.pending).remove(&envelope.message_id) {
                // The waiter may have timed out meanwhile
                Some(tx) => {
                    let _ = tx.send(status);
                }
                None => trace!(message_id = %envelope.message_id, "acknowledgement without waiter"),
            },
            Payload::Topic(message) => self.route_topic(message),
            Payload::Intent(intent) => {
                lock(&self.intent_sinks)
                    .retain(|_, sink| !sink.selector.matches(&intent) || sink.tx.send(intent.clone()).is_ok());
            }
            other => debug!(payload = ?other, "unexpected frame from broker"),
        }
    }

    fn route_topic(&self, message: TopicMessage) {
        if message.topic == topics::STARTUP_COMPLETED {
            self.startup.send_replace(true);
        }
        let Some(subscriber_id) = message.header_str(headers::SUBSCRIBER_ID).map(str::to_string) else {
            debug!(topic = %message.topic, "topic delivery without subscriber id");
            return;
        };

        let mut subscribers = lock(&self.subscribers);
        if let Some(tx) = subscribers.get(&subscriber_id) {
            if tx.send(message).is_err() {
                subscribers.remove(&subscriber_id);
            }
        }
    }

    /// Fail every waiter and end every stream.
    pub(crate) fn close(&self) {
        lock(&self.pending).clear();
        lock(&self.subscribers).clear();
        lock(&self.intent_sinks).clear();
    }
}

/// Read the broker-to-context port until the broker goes away.
pub(crate) async fn run_dispatcher(routing: Arc<Routing>, mut inbound: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(envelope) = inbound.recv().await {
        routing.route(envelope);
    }
    debug!("broker port closed");
    routing.close();
}

//! Wire envelope and message payloads.
//!
//! Every frame exchanged between a context and the broker is an [`Envelope`].
//! Frames sent by a context are acknowledged with a [`Payload::Status`]
//! envelope carrying the same `message_id`.

use crate::core::{random_id, Error, Result, WireError};
use crate::qualifier::Qualifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known message headers.
pub mod headers {
    /// Reply status, [`REPLY_OK`](super::REPLY_OK) or [`REPLY_ERROR`](super::REPLY_ERROR)
    pub const STATUS: &str = "ɵstatus";
    /// Local subscriber a topic delivery is addressed to
    pub const SUBSCRIBER_ID: &str = "ɵsubscriber-id";
    /// Application that sent the message, stamped by the broker
    pub const APP_SYMBOLIC_NAME: &str = "ɵapp-symbolic-name";
}

/// Reply status header value for success.
pub const REPLY_OK: &str = "OK";

/// Reply status header value for failure; the body carries a [`WireError`].
pub const REPLY_ERROR: &str = "ERROR";

/// Direction of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ContextToBroker,
    BrokerToContext,
}

/// Logical channel of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Connect,
    Disconnect,
    Topic,
    TopicSubscribe,
    TopicUnsubscribe,
    Intent,
}

/// Delivery acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Accepted for delivery
    pub ok: bool,
    /// Reason, when not accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl DeliveryStatus {
    /// Successful acknowledgement.
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    /// Failed acknowledgement.
    pub fn failed(error: &Error) -> Self {
        Self {
            ok: false,
            error: Some(error.to_wire()),
        }
    }

    /// Convert into a result, decoding the typed error.
    pub fn into_result(self) -> Result<()> {
        if self.ok {
            return Ok(());
        }
        Err(self.error.map(Error::from_wire).unwrap_or_else(|| {
            Error::MessageDispatch("delivery rejected without reason".into())
        }))
    }
}

/// A message published to a topic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    /// Destination topic
    pub topic: String,
    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Headers
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    /// Keep as the topic's retained message
    #[serde(default)]
    pub retain: bool,
    /// Topic replies should be sent to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Values bound by the receiving subscription's topic pattern
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl TopicMessage {
    /// Create a message for `topic`.
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            ..Default::default()
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Mark as retained.
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    /// Set the reply topic.
    pub fn with_reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    /// Get a string header.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(Value::as_str)
    }

    /// Build a successful reply to `reply_to`.
    pub fn reply(reply_to: &str, body: impl Into<Value>) -> Self {
        Self::new(reply_to)
            .with_body(body)
            .with_header(headers::STATUS, REPLY_OK)
    }

    /// Build an error reply to `reply_to`.
    pub fn error_reply(reply_to: &str, error: &Error) -> Self {
        let body = serde_json::to_value(error.to_wire()).unwrap_or(Value::Null);
        Self::new(reply_to)
            .with_body(body)
            .with_header(headers::STATUS, REPLY_ERROR)
    }

    /// Decode the reply status: the typed error for error replies, the
    /// message itself otherwise.
    pub fn into_reply(self) -> Result<Self> {
        if self.header_str(headers::STATUS) != Some(REPLY_ERROR) {
            return Ok(self);
        }
        let wire: WireError = match &self.body {
            Some(body) => serde_json::from_value(body.clone())?,
            None => return Err(Error::Internal("error reply without body".into())),
        };
        Err(Error::from_wire(wire))
    }

    /// Deserialize the body.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone().unwrap_or(Value::Null))?)
    }
}

/// An intent issued to whoever provides a matching capability.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentMessage {
    /// Functional type
    #[serde(rename = "type")]
    pub intent_type: String,
    /// Concrete qualifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<Qualifier>,
    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Headers
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    /// Topic replies should be sent to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl IntentMessage {
    /// Create an intent of the given type.
    pub fn new(intent_type: &str) -> Self {
        Self {
            intent_type: intent_type.to_string(),
            ..Default::default()
        }
    }

    /// Set the qualifier.
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Set the reply topic.
    pub fn with_reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    /// Get a string header.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(Value::as_str)
    }
}

/// Frame payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Handshake request
    Connect { symbolic_app_name: String },
    /// Orderly goodbye
    Disconnect,
    /// Topic message
    Topic(TopicMessage),
    /// Subscription request
    Subscribe { topic: String, subscriber_id: String },
    /// Subscription cancellation
    Unsubscribe { subscriber_id: String },
    /// Intent
    Intent(IntentMessage),
    /// Delivery acknowledgement
    Status(DeliveryStatus),
}

impl Payload {
    /// Channel this payload travels on; `None` for acknowledgements, which
    /// reuse the channel of the acknowledged frame.
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Payload::Connect { .. } => Some(Channel::Connect),
            Payload::Disconnect => Some(Channel::Disconnect),
            Payload::Topic(_) => Some(Channel::Topic),
            Payload::Subscribe { .. } => Some(Channel::TopicSubscribe),
            Payload::Unsubscribe { .. } => Some(Channel::TopicUnsubscribe),
            Payload::Intent(_) => Some(Channel::Intent),
            Payload::Status(_) => None,
        }
    }
}

/// A frame on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Direction
    pub transport: Direction,
    /// Logical channel
    pub channel: Channel,
    /// Payload
    pub message: Payload,
    /// Correlation id; acknowledgements reuse the id of the acknowledged frame
    pub message_id: String,
}

impl Envelope {
    fn to_broker(channel: Channel, message: Payload) -> Self {
        Self {
            transport: Direction::ContextToBroker,
            channel,
            message,
            message_id: random_id(),
        }
    }

    /// Whether the payload kind belongs on the envelope's channel.
    pub fn is_on_channel(&self) -> bool {
        self.message
            .channel()
            .map_or(true, |channel| channel == self.channel)
    }

    fn to_context(channel: Channel, message: Payload) -> Self {
        Self {
            transport: Direction::BrokerToContext,
            channel,
            message,
            message_id: random_id(),
        }
    }

    /// Handshake request.
    pub fn connect(symbolic_app_name: &str) -> Self {
        Self::to_broker(
            Channel::Connect,
            Payload::Connect {
                symbolic_app_name: symbolic_app_name.to_string(),
            },
        )
    }

    /// Disconnect notice.
    pub fn disconnect() -> Self {
        Self::to_broker(Channel::Disconnect, Payload::Disconnect)
    }

    /// Publish a topic message.
    pub fn publish(message: TopicMessage) -> Self {
        Self::to_broker(Channel::Topic, Payload::Topic(message))
    }

    /// Subscribe to a topic.
    pub fn subscribe(topic: &str, subscriber_id: &str) -> Self {
        Self::to_broker(
            Channel::TopicSubscribe,
            Payload::Subscribe {
                topic: topic.to_string(),
                subscriber_id: subscriber_id.to_string(),
            },
        )
    }

    /// Cancel a subscription.
    pub fn unsubscribe(subscriber_id: &str) -> Self {
        Self::to_broker(
            Channel::TopicUnsubscribe,
            Payload::Unsubscribe {
                subscriber_id: subscriber_id.to_string(),
            },
        )
    }

    /// Issue an intent.
    pub fn intent(message: IntentMessage) -> Self {
        Self::to_broker(Channel::Intent, Payload::Intent(message))
    }

    /// Topic delivery to a context.
    pub fn deliver_topic(message: TopicMessage) -> Self {
        Self::to_context(Channel::Topic, Payload::Topic(message))
    }

    /// Intent delivery to a context.
    pub fn deliver_intent(message: IntentMessage) -> Self {
        Self::to_context(Channel::Intent, Payload::Intent(message))
    }

    /// Acknowledge this frame.
    pub fn acknowledge(&self, status: DeliveryStatus) -> Self {
        Self {
            transport: Direction::BrokerToContext,
            channel: self.channel,
            message: Payload::Status(status),
            message_id: self.message_id.clone(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

//! Transport layer
//!
//! Wire types and the transport seam:
//! - Envelopes, channels and message payloads
//! - Delivery acknowledgements and reply status headers
//! - The `Transport` trait and an in-process channel implementation

pub mod channel;
pub mod envelope;

pub use channel::{ChannelTransport, Transport};
pub use envelope::{
    headers, Channel, DeliveryStatus, Direction, Envelope, IntentMessage, Payload, TopicMessage,
    REPLY_ERROR, REPLY_OK,
};

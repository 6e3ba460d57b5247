//! Message client runtime
//!
//! The per-context side of the broker:
//! - Publish/observe and request/reply with delivery acknowledgements
//! - Issuing intents and handling the intents addressed to the context
//! - Manifest registration and (live) lookups
//! - Requests held back until the host finishes starting up

pub mod manifest;
pub mod message_client;
mod routing;
pub mod subscription;

pub use manifest::{ManifestClient, ManifestLookup};
pub use message_client::MessageClient;
pub use subscription::{IntentSelector, IntentSubscription, ReplyStream, Subscription};

//! The broker
//!
//! Mediates all traffic between contexts:
//! - Connection handshake and per-frame origin verification
//! - Topic publish/subscribe with patterns, retained messages and
//!   subscriber-count watchers
//! - Intent routing to visible capability providers
//! - Manifest registration and live lookups over reserved topics

pub mod connection;
pub mod handle;
pub mod intent;
pub mod manifest_service;
pub mod service;
pub mod topic;
pub mod topics;

pub use connection::{Connection, ConnectionRegistry};
pub use handle::{BrokerEvent, BrokerHandle, ContextEndpoint, InboundFrame};
pub use intent::{IntentRoute, IntentRouter, RouterMetrics};
pub use manifest_service::ManifestService;
pub use service::Broker;
pub use topic::{match_topic, validate_topic, Subscriber, TopicRoute, TopicRouter};

//! # Intent Broker
//!
//! A message broker for mutually untrusted execution contexts: a host
//! application and the sub-applications it embeds. It provides:
//! - **Connections**: origin-verified handshake per context
//! - **Topics**: publish/subscribe and request/reply with acknowledgements
//! - **Manifests**: capabilities and intentions declared per application
//! - **Intents**: routing of intents to visible capability providers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use intent_broker::broker::Broker;
//! use intent_broker::client::MessageClient;
//! use intent_broker::core::{ApplicationConfig, BrokerConfig};
//! use intent_broker::transport::TopicMessage;
//!
//! #[tokio::main]
//! async fn main() -> intent_broker::Result<()> {
//!     let config = BrokerConfig::with_applications(vec![
//!         ApplicationConfig::new("host", "https://host.example"),
//!     ]);
//!     let (broker, handle) = Broker::new(config);
//!     broker.spawn();
//!     handle.signal_startup_completed()?;
//!
//!     let endpoint = handle.attach("https://host.example")?;
//!     let client = MessageClient::connect(endpoint, "host", handle.client_config()).await?;
//!     client.publish(TopicMessage::new("news").with_body("hello")).await?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod broker;
pub mod client;
pub mod core;
pub mod manifest;
pub mod qualifier;
pub mod transport;

pub use core::error::{Error, Result};

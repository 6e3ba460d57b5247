//! Core utilities and common types for the broker.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{ApplicationConfig, BrokerConfig, ClientConfig};
pub use error::{Error, ErrorKind, Result, WireError};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use types::*;

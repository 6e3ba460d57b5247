//! Error types for the intent broker.
//!
//! Every failure a context can observe has a typed variant here. Failures
//! raised inside the broker travel back over the wire as a [`WireError`] and
//! are turned into the same variant on the calling side.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in broker and client operations.
#[derive(Error, Debug)]
pub enum Error {
    // Handshake errors
    #[error("Connection refused: {0}")]
    Connect(String),

    // Dispatch errors
    #[error("Message dispatch failed: {0}")]
    MessageDispatch(String),

    #[error("Invalid topic: {0}")]
    Topic(String),

    #[error("Intent dispatch failed: {0}")]
    IntentDispatch(String),

    #[error("Not qualified: {0}")]
    NotQualified(String),

    #[error("No capability provider: {0}")]
    NullCapabilityProvider(String),

    #[error("No replier: {0}")]
    NoReplier(String),

    // Manifest errors
    #[error("Intention registration failed: {0}")]
    IntentionRegister(String),

    #[error("Capability registration failed: {0}")]
    CapabilityRegister(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

/// Error classification as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connect,
    MessageDispatch,
    Topic,
    IntentDispatch,
    NotQualified,
    NullCapabilityProvider,
    NoReplier,
    IntentionRegister,
    CapabilityRegister,
    Serialization,
    Internal,
}

/// Serializable form of an [`Error`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Error classification
    pub kind: ErrorKind,
    /// Detail message, without the variant prefix
    pub message: String,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect(_) => ErrorKind::Connect,
            Error::MessageDispatch(_) => ErrorKind::MessageDispatch,
            Error::Topic(_) => ErrorKind::Topic,
            Error::IntentDispatch(_) => ErrorKind::IntentDispatch,
            Error::NotQualified(_) => ErrorKind::NotQualified,
            Error::NullCapabilityProvider(_) => ErrorKind::NullCapabilityProvider,
            Error::NoReplier(_) => ErrorKind::NoReplier,
            Error::IntentionRegister(_) => ErrorKind::IntentionRegister,
            Error::CapabilityRegister(_) => ErrorKind::CapabilityRegister,
            Error::SerializationError(_) => ErrorKind::Serialization,
            Error::Internal(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Convert to the wire representation.
    pub fn to_wire(&self) -> WireError {
        let message = match self {
            Error::Connect(m)
            | Error::MessageDispatch(m)
            | Error::Topic(m)
            | Error::IntentDispatch(m)
            | Error::NotQualified(m)
            | Error::NullCapabilityProvider(m)
            | Error::NoReplier(m)
            | Error::IntentionRegister(m)
            | Error::CapabilityRegister(m)
            | Error::SerializationError(m)
            | Error::Internal(m) => m.clone(),
            Error::Io(e) => e.to_string(),
        };
        WireError {
            kind: self.kind(),
            message,
        }
    }

    /// Rebuild a typed error from its wire representation.
    pub fn from_wire(wire: WireError) -> Self {
        let m = wire.message;
        match wire.kind {
            ErrorKind::Connect => Error::Connect(m),
            ErrorKind::MessageDispatch => Error::MessageDispatch(m),
            ErrorKind::Topic => Error::Topic(m),
            ErrorKind::IntentDispatch => Error::IntentDispatch(m),
            ErrorKind::NotQualified => Error::NotQualified(m),
            ErrorKind::NullCapabilityProvider => Error::NullCapabilityProvider(m),
            ErrorKind::NoReplier => Error::NoReplier(m),
            ErrorKind::IntentionRegister => Error::IntentionRegister(m),
            ErrorKind::CapabilityRegister => Error::CapabilityRegister(m),
            ErrorKind::Serialization => Error::SerializationError(m),
            ErrorKind::Internal => Error::Internal(m),
        }
    }
}

//! Common types used across broker modules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one transport endpoint attached to the broker.
///
/// Assigned by the hosting environment when a context is attached; a context
/// keeps the same handle for as long as its transport lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransportHandle(pub u64);

impl std::fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Generate a fresh random identifier (message ids, subscriber ids, reply topics).
pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string()
}

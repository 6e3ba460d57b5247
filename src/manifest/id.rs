//! Deterministic manifest object ids.

use crate::qualifier::Qualifier;
use sha3::{Digest, Sha3_256};

/// Object type under which implicit intention ids are derived. The `ɵ` prefix
/// keeps it apart from any declared type.
pub const IMPLICIT_INTENTION_TYPE: &str = "ɵimplicit-intention";

/// Number of digest bytes kept in an id (hex-encoded to twice as many chars).
pub const ID_BYTES: usize = 8;

/// Derives the id of a manifest object from its identity.
///
/// Must be pure: the same `(app, type, qualifier)` always yields the same id.
pub trait IdGenerator: Send + Sync {
    /// Generate the id for an object declared by `app`.
    fn generate(&self, app: &str, object_type: &str, qualifier: &Qualifier) -> String;

    /// Id of the implicit intention of the capability `capability_id`.
    ///
    /// Never collides with the id of an explicit intention of the same
    /// `(app, type, qualifier)`.
    fn implicit_intention_id(&self, app: &str, capability_id: &str) -> String {
        let qualifier = Qualifier::empty().with("providedBy", capability_id);
        self.generate(app, IMPLICIT_INTENTION_TYPE, &qualifier)
    }
}

/// SHA3-256 content hash truncated to [`ID_BYTES`].
#[derive(Clone, Debug, Default)]
pub struct Sha3IdGenerator;

impl IdGenerator for Sha3IdGenerator {
    fn generate(&self, app: &str, object_type: &str, qualifier: &Qualifier) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(app.as_bytes());
        hasher.update([0u8]);
        hasher.update(object_type.as_bytes());
        hasher.update([0u8]);
        // Entries iterate in key order
        for (key, value) in qualifier.iter() {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        hex::encode(&digest[..ID_BYTES])
    }
}

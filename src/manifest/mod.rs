//! Application manifests
//!
//! Capabilities (functionality offered) and intentions (functionality
//! consumed), with:
//! - An indexed in-memory object store with change signalling
//! - Deterministic content-hash ids
//! - A registry enforcing registration and visibility rules

pub mod id;
pub mod model;
pub mod registry;
pub mod store;

pub use id::{IdGenerator, Sha3IdGenerator};
pub use model::{
    Capability, CapabilityDescriptor, Intention, IntentionDescriptor, ManifestObject,
    ManifestObjectFilter, ManifestObjectMetadata, Visibility,
};
pub use registry::{ManifestChanges, ManifestRegistry};
pub use store::ManifestObjectStore;

//! Manifest objects: capabilities and intentions.
//!
//! Both share a type, a qualifier and registration metadata, and are kept in
//! a [`ManifestObjectStore`](crate::manifest::ManifestObjectStore).

use crate::core::Timestamp;
use crate::qualifier::Qualifier;
use serde::{Deserialize, Serialize};

/// Registration metadata attached by the broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestObjectMetadata {
    /// Stable id derived from (application, type, qualifier)
    pub id: String,
    /// Declaring application
    pub app_symbolic_name: String,
    /// Registration time
    pub registered_at: Timestamp,
}

/// Common view over capabilities and intentions.
pub trait ManifestObject: Clone {
    /// Functional type.
    fn object_type(&self) -> &str;

    /// Qualifier pattern.
    fn qualifier(&self) -> &Qualifier;

    /// Registration metadata.
    fn metadata(&self) -> &ManifestObjectMetadata;

    /// Object id.
    fn id(&self) -> &str {
        &self.metadata().id
    }

    /// Declaring application.
    fn app_symbolic_name(&self) -> &str {
        &self.metadata().app_symbolic_name
    }
}

/// Who may see a capability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to the owning application only
    #[default]
    Private,
    /// Visible to every application
    Public,
}

/// Functionality an application offers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Functional type
    #[serde(rename = "type")]
    pub capability_type: String,
    /// Qualifier pattern
    #[serde(default)]
    pub qualifier: Qualifier,
    /// Visibility
    #[serde(default)]
    pub visibility: Visibility,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
    /// Registration metadata
    pub metadata: ManifestObjectMetadata,
}

impl Capability {
    /// Whether the capability is private.
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }
}

impl ManifestObject for Capability {
    fn object_type(&self) -> &str {
        &self.capability_type
    }

    fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    fn metadata(&self) -> &ManifestObjectMetadata {
        &self.metadata
    }
}

/// Declaration that an application consumes functionality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intention {
    /// Functional type
    #[serde(rename = "type")]
    pub intention_type: String,
    /// Qualifier pattern
    #[serde(default)]
    pub qualifier: Qualifier,
    /// Derived from a capability the same application provides
    #[serde(default)]
    pub implicit: bool,
    /// Providing capability, for implicit intentions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided_by: Option<String>,
    /// Registration metadata
    pub metadata: ManifestObjectMetadata,
}

impl ManifestObject for Intention {
    fn object_type(&self) -> &str {
        &self.intention_type
    }

    fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    fn metadata(&self) -> &ManifestObjectMetadata {
        &self.metadata
    }
}

/// Capability as submitted for registration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Functional type
    #[serde(rename = "type")]
    pub capability_type: String,
    /// Qualifier pattern
    #[serde(default)]
    pub qualifier: Qualifier,
    /// Visibility
    #[serde(default)]
    pub visibility: Visibility,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

impl CapabilityDescriptor {
    /// Create a private capability descriptor.
    pub fn new(capability_type: &str) -> Self {
        Self {
            capability_type: capability_type.to_string(),
            ..Default::default()
        }
    }

    /// Set the qualifier.
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    /// Make the capability public.
    pub fn public(mut self) -> Self {
        self.visibility = Visibility::Public;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set free-form properties.
    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// Intention as submitted for registration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentionDescriptor {
    /// Functional type
    #[serde(rename = "type")]
    pub intention_type: String,
    /// Qualifier pattern
    #[serde(default)]
    pub qualifier: Qualifier,
}

impl IntentionDescriptor {
    /// Create an intention descriptor.
    pub fn new(intention_type: &str) -> Self {
        Self {
            intention_type: intention_type.to_string(),
            qualifier: Qualifier::empty(),
        }
    }

    /// Set the qualifier.
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }
}

/// Filter for querying manifest objects.
///
/// All given criteria are ANDed; an empty filter matches everything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestObjectFilter {
    /// Filter by id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Filter by type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// Filter by qualifier, compared with the caller's matcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<Qualifier>,
    /// Filter by declaring application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_symbolic_name: Option<String>,
}

impl ManifestObjectFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by id.
    pub fn by_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Filter by type.
    pub fn by_type(mut self, object_type: &str) -> Self {
        self.object_type = Some(object_type.to_string());
        self
    }

    /// Filter by qualifier.
    pub fn by_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    /// Filter by application.
    pub fn by_app(mut self, app_symbolic_name: &str) -> Self {
        self.app_symbolic_name = Some(app_symbolic_name.to_string());
        self
    }
}

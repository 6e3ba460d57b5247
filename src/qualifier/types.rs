//! Qualifier representation.
//!
//! A qualifier is an unordered map of string keys to scalar values that
//! distinguishes variants of a capability or intention type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value meaning "any non-null value required".
pub const WILDCARD: &str = "*";

/// Value meaning "optional, any value or absent".
pub const OPTIONAL: &str = "?";

/// Key/value map distinguishing variants of a type.
///
/// Values are JSON scalars (string, number, boolean). Pattern qualifiers may
/// use [`WILDCARD`] and [`OPTIONAL`] as values, and [`WILDCARD`] as a key to
/// admit additional entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qualifier(BTreeMap<String, Value>);

pub(crate) static EMPTY: Qualifier = Qualifier::empty();

impl Qualifier {
    /// Create an empty qualifier.
    pub const fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Create the qualifier `{"*": "*"}`, matching any non-empty qualifier.
    pub fn any() -> Self {
        Self::empty().with(WILDCARD, WILDCARD)
    }

    /// Add an entry.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Insert an entry, returning the previous value.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.to_string(), value.into())
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Check whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the `"*"` key is present.
    pub fn has_wildcard_key(&self) -> bool {
        self.0.contains_key(WILDCARD)
    }

    /// Whether the qualifier is free of wildcard keys and values.
    pub fn is_concrete(&self) -> bool {
        !self.has_wildcard_key() && !self.0.values().any(|v| is_wildcard(v) || is_optional(v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Qualifier {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Whether the value is the `"*"` wildcard.
pub fn is_wildcard(value: &Value) -> bool {
    value.as_str() == Some(WILDCARD)
}

/// Whether the value is the `"?"` optional marker.
pub fn is_optional(value: &Value) -> bool {
    value.as_str() == Some(OPTIONAL)
}

//! Qualifiers and qualifier matching
//!
//! Provides the qualifier map and the three matching semantics:
//! - Structural equality
//! - Symmetric wildcard lookup
//! - Asymmetric intent satisfaction

pub mod matcher;
pub mod types;

pub use matcher::{is_equal, matches_intent, matches_wildcard};
pub use types::{is_optional, is_wildcard, Qualifier, OPTIONAL, WILDCARD};

/// Signature shared by the qualifier matchers.
pub type QualifierMatcher = fn(Option<&Qualifier>, Option<&Qualifier>) -> bool;

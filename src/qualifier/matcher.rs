//! Qualifier matching.
//!
//! Three pure predicates:
//! - [`is_equal`]: structural equality, used when removing manifest objects
//! - [`matches_wildcard`]: symmetric matcher for lookups
//! - [`matches_intent`]: asymmetric matcher deciding whether a pattern is
//!   satisfied by a concrete intent qualifier
//!
//! Absent qualifiers are treated as empty. Values compare with strict type and
//! value equality, so `"1"` never equals `1`.

use crate::qualifier::types::{is_optional, is_wildcard, Qualifier, EMPTY, WILDCARD};
use serde_json::Value;
use std::collections::BTreeSet;

/// Structural equality. `"*"` and `"?"` are ordinary values here.
pub fn is_equal(a: Option<&Qualifier>, b: Option<&Qualifier>) -> bool {
    a.unwrap_or(&EMPTY) == b.unwrap_or(&EMPTY)
}

/// Symmetric wildcard matcher used for lookups.
///
/// Either side may carry wildcards. A `"*"` key on one side admits entries
/// the other side has in addition.
pub fn matches_wildcard(a: Option<&Qualifier>, b: Option<&Qualifier>) -> bool {
    let a = a.unwrap_or(&EMPTY);
    let b = b.unwrap_or(&EMPTY);
    let a_open = a.has_wildcard_key();
    let b_open = b.has_wildcard_key();

    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).filter(|k| *k != WILDCARD).collect();
    keys.into_iter().all(|key| match (a.get(key), b.get(key)) {
        (Some(va), Some(vb)) => wildcard_values_match(va, vb),
        (Some(va), None) => is_optional(va) || b_open,
        (None, Some(vb)) => is_optional(vb) || a_open,
        (None, None) => true,
    })
}

fn wildcard_values_match(a: &Value, b: &Value) -> bool {
    if is_optional(a) || is_optional(b) {
        return true;
    }
    if is_wildcard(a) {
        return !b.is_null();
    }
    if is_wildcard(b) {
        return !a.is_null();
    }
    a == b
}

/// Asymmetric matcher: is the concrete `testee` satisfied by `pattern`?
///
/// The testee is assumed to be wildcard-free; wildcard values in it are
/// compared literally. A `"*": "*"` entry in the pattern requires at least one
/// testee entry beyond the named ones, `"*": "?"` merely permits them.
pub fn matches_intent(pattern: Option<&Qualifier>, testee: Option<&Qualifier>) -> bool {
    let pattern = pattern.unwrap_or(&EMPTY);
    let testee = testee.unwrap_or(&EMPTY);

    let named_entries_match = pattern
        .iter()
        .filter(|(key, _)| *key != WILDCARD)
        .all(|(key, expected)| {
            if is_optional(expected) {
                return true;
            }
            match testee.get(key) {
                None => false,
                Some(actual) if is_wildcard(expected) => !actual.is_null(),
                Some(actual) => actual == expected,
            }
        });
    if !named_entries_match {
        return false;
    }

    match pattern.get(WILDCARD) {
        None => testee.keys().all(|key| pattern.contains_key(key)),
        Some(value) if is_optional(value) => true,
        Some(_) => testee
            .keys()
            .any(|key| key != WILDCARD && !pattern.contains_key(key)),
    }
}

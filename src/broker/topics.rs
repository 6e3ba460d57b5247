//! Reserved control topics served by the broker itself.

/// Request: body is the watched topic; replies carry its subscriber count.
pub const SUBSCRIBER_COUNT: &str = "ɵbroker/subscriber-count";

/// Retained, published by the host once it has finished starting up.
pub const STARTUP_COMPLETED: &str = "ɵbroker/startup-completed";

/// Request: body is a filter; replies carry the visible capabilities.
pub const LOOKUP_CAPABILITIES: &str = "ɵmanifest/capabilities/lookup";

/// Request: body is a capability descriptor; reply carries the id.
pub const REGISTER_CAPABILITY: &str = "ɵmanifest/capabilities/register";

/// Request: body is a filter; reply carries the removed ids.
pub const UNREGISTER_CAPABILITIES: &str = "ɵmanifest/capabilities/unregister";

/// Request: body is a filter; replies carry the matching intentions.
pub const LOOKUP_INTENTIONS: &str = "ɵmanifest/intentions/lookup";

/// Request: body is an intention descriptor; reply carries the id.
pub const REGISTER_INTENTION: &str = "ɵmanifest/intentions/register";

/// Request: body is a filter; reply carries the removed ids.
pub const UNREGISTER_INTENTIONS: &str = "ɵmanifest/intentions/unregister";

/// Prefix of generated reply topics.
pub const REPLY_PREFIX: &str = "ɵreply/";

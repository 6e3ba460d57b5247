//! Application directory
//!
//! The set of applications known to the host, with their origins and
//! per-application access toggles.

pub mod registry;

pub use registry::{Application, ApplicationRegistry};

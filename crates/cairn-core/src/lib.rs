//! Cairn Core
//!
//! Shared vocabulary for recording build-rule artifacts: identifiers, the
//! error type, lifecycle events, cache types, and the port traits through
//! which the recorder talks to its collaborators (metadata store, content
//! hasher, remote cache, event sink).

pub mod cache;
pub mod error;
pub mod events;
pub mod ids;
pub mod ports;

pub use error::{Error, Result};
pub use ids::*;

//! Logging integration for Cairn.
//!
//! Installs the `tracing` subscriber used by binaries and tests, and
//! provides the spans the artifact recorder opens around its operations.

pub mod spans;
pub mod tracer;

pub use spans::{RuleAttributes, cache_store_span, metadata_write_span, packaging_span};
pub use tracer::{LogFormat, LoggingConfig, TracerError, init_logging, init_test_logging};

//! Span creation for artifact recording operations.

use tracing::{Level, Span, span};

/// Attributes shared by every span opened for one rule.
#[derive(Debug, Default, Clone)]
pub struct RuleAttributes {
    pub rule: String,
    pub build_id: Option<String>,
}

impl RuleAttributes {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            build_id: None,
        }
    }

    pub fn build(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }
}

/// Span around persisting a rule's metadata.
pub fn metadata_write_span(attrs: &RuleAttributes, clear_existing: bool) -> Span {
    span!(
        Level::DEBUG,
        "metadata.write",
        build.rule = attrs.rule.as_str(),
        build.id = attrs.build_id.as_deref().unwrap_or(""),
        clear_existing = clear_existing,
    )
}

/// Span around building an artifact archive.
pub fn packaging_span(attrs: &RuleAttributes, entries: usize) -> Span {
    span!(
        Level::DEBUG,
        "artifact.package",
        build.rule = attrs.rule.as_str(),
        build.id = attrs.build_id.as_deref().unwrap_or(""),
        entries = entries,
    )
}

/// Span around a cache store call.
pub fn cache_store_span(attrs: &RuleAttributes, keys: usize) -> Span {
    span!(
        Level::DEBUG,
        "cache.store",
        build.rule = attrs.rule.as_str(),
        cache.keys = keys,
    )
}

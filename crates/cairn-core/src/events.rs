//! Lifecycle events posted while recording and uploading artifacts.

use crate::ids::{CacheKey, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All events emitted by the artifact recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ArtifactCompressionStarted(ArtifactCompressionStartedPayload),
    ArtifactCompressionFinished(ArtifactCompressionFinishedPayload),
    Console(ConsolePayload),
}

impl Event {
    /// Returns the subject this event is published under.
    pub fn subject(&self) -> String {
        match self {
            Event::ArtifactCompressionStarted(p) => {
                format!("artifact.compression.started.{}", p.event_id)
            }
            Event::ArtifactCompressionFinished(p) => {
                format!("artifact.compression.finished.{}", p.event_id)
            }
            Event::Console(p) => format!("console.{}", p.level.as_str()),
        }
    }

    pub fn console(level: ConsoleLevel, message: impl Into<String>) -> Self {
        Event::Console(ConsolePayload {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionOperation {
    Compress,
    Decompress,
}

// === Compression Payloads ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactCompressionStartedPayload {
    pub event_id: EventId,
    pub operation: CompressionOperation,
    pub rule_keys: Vec<CacheKey>,
    pub started_at: DateTime<Utc>,
}

impl ArtifactCompressionStartedPayload {
    pub fn new(operation: CompressionOperation, rule_keys: Vec<CacheKey>) -> Self {
        Self {
            event_id: EventId::new(),
            operation,
            rule_keys,
            started_at: Utc::now(),
        }
    }

    /// Builds the matching finished payload.
    pub fn finished(&self) -> ArtifactCompressionFinishedPayload {
        let finished_at = Utc::now();
        ArtifactCompressionFinishedPayload {
            event_id: self.event_id,
            operation: self.operation,
            rule_keys: self.rule_keys.clone(),
            duration_ms: (finished_at - self.started_at).num_milliseconds().max(0) as u64,
            finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactCompressionFinishedPayload {
    pub event_id: EventId,
    pub operation: CompressionOperation,
    pub rule_keys: Vec<CacheKey>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

// === Console Payloads ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Info,
    Warning,
    Severe,
}

impl ConsoleLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warning => "warning",
            ConsoleLevel::Severe => "severe",
        }
    }
}

/// A message meant for the user's console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolePayload {
    pub level: ConsoleLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

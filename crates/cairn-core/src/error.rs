//! Error types for Cairn.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Recording errors
    #[error("Error! '{rule}' is trying to record artifacts with absolute path: '{}'.", path.display())]
    AbsoluteArtifactPath { rule: String, path: PathBuf },

    // Collaborator errors
    #[error("Metadata store error: {0}")]
    MetadataStore(String),

    #[error("Failed to hash {}: {reason}", path.display())]
    ContentHash { path: PathBuf, reason: String },

    #[error("Packaging failed: {0}")]
    Packaging(String),

    #[error("Cache store failed: {0}")]
    CacheStore(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

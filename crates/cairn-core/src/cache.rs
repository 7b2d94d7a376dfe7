//! Cache types.

use crate::ids::CacheKey;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Metadata key synthesized into every artifact's metadata record.
pub const ADDITIONAL_INFO: &str = "ADDITIONAL_INFO";

/// SHA-256 digest identifying file or artifact content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_digest(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Whether a cache accepts reads and writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    #[default]
    ReadWrite,
    ReadOnly,
    Disabled,
}

impl CacheMode {
    pub fn is_writable(self) -> bool {
        matches!(self, CacheMode::ReadWrite)
    }

    pub fn is_readable(self) -> bool {
        matches!(self, CacheMode::ReadWrite | CacheMode::ReadOnly)
    }
}

/// What gets stored alongside an artifact archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub rule_keys: BTreeSet<CacheKey>,
    pub metadata: IndexMap<String, String>,
}

/// Archive handed to a cache, tagged with whether the cache may take it over.
///
/// A `Borrowable` path may be moved by the cache instead of copied; the
/// producer only deletes whatever is left at the path afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactPath {
    Borrowable(PathBuf),
    NonBorrowable(PathBuf),
}

impl ArtifactPath {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactPath::Borrowable(p) | ArtifactPath::NonBorrowable(p) => p,
        }
    }

    pub fn is_borrowable(&self) -> bool {
        matches!(self, ArtifactPath::Borrowable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_mode_writability() {
        assert!(CacheMode::ReadWrite.is_writable());
        assert!(!CacheMode::ReadOnly.is_writable());
        assert!(!CacheMode::Disabled.is_writable());
        assert!(CacheMode::ReadOnly.is_readable());
        assert!(!CacheMode::Disabled.is_readable());
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::from_digest([0xab; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_string().starts_with("abab"));
    }

    #[test]
    fn test_artifact_path_accessors() {
        let borrowed = ArtifactPath::Borrowable(PathBuf::from("/tmp/a.tar"));
        assert!(borrowed.is_borrowable());
        assert_eq!(borrowed.path(), Path::new("/tmp/a.tar"));
        assert!(!ArtifactPath::NonBorrowable(PathBuf::from("/tmp/b.tar")).is_borrowable());
    }
}

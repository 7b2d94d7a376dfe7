//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the artifact recorder and the
//! collaborators it does not own.

use crate::cache::{ArtifactInfo, ArtifactPath, CacheMode, ContentHash};
use crate::events::Event;
use crate::ids::RuleId;
use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;

/// Persistent key/value build metadata, per rule.
pub trait MetadataStore: Send + Sync {
    /// Merge `metadata` into whatever is stored for `rule`.
    fn update_metadata(&self, rule: &RuleId, metadata: &IndexMap<String, String>) -> Result<()>;

    /// Forget everything stored for `rule`.
    fn delete_metadata(&self, rule: &RuleId) -> Result<()>;
}

/// Content hashes of files on disk.
pub trait ContentHasher: Send + Sync {
    /// Hash the file or directory at an absolute path.
    fn hash(&self, path: &Path) -> Result<ContentHash>;
}

/// Artifact cache that accepts packaged outputs.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Current read/write mode.
    fn mode(&self) -> CacheMode;

    /// Store an archive under every key in `info.rule_keys`.
    async fn store(&self, info: ArtifactInfo, artifact: ArtifactPath) -> Result<()>;
}

/// Fire-and-forget event notification. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn post(&self, event: Event);
}

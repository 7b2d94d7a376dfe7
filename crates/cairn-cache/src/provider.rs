//! Local directory artifact cache.

use crate::keys::sanitize_key;
use async_trait::async_trait;
use cairn_core::cache::{ArtifactInfo, ArtifactPath, CacheMode};
use cairn_core::ports::RemoteCache;
use cairn_core::{CacheKey, Error, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const ARTIFACT_FILE: &str = "artifact";
const METADATA_FILE: &str = "metadata.json";

/// Filesystem-based cache for local development and tests.
///
/// Each key gets a directory `<root>/<sanitized key>/` holding the archive
/// and a JSON copy of the artifact metadata.
pub struct FilesystemCache {
    root_dir: PathBuf,
    mode: CacheMode,
}

impl FilesystemCache {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            mode: CacheMode::ReadWrite,
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    fn key_dir(&self, key: &CacheKey) -> PathBuf {
        self.root_dir.join(sanitize_key(key.as_str()))
    }

    /// Location of the stored archive for `key`.
    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.key_dir(key).join(ARTIFACT_FILE)
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        tokio::fs::try_exists(self.artifact_path(key))
            .await
            .unwrap_or(false)
    }

    pub async fn load_metadata(&self, key: &CacheKey) -> Result<Option<IndexMap<String, String>>> {
        if !self.mode.is_readable() {
            return Ok(None);
        }
        let path = self.key_dir(key).join(METADATA_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_one(
        &self,
        key: &CacheKey,
        source: &Path,
        move_source: bool,
        metadata: &str,
    ) -> Result<()> {
        let key_dir = self.key_dir(key);
        tokio::fs::create_dir_all(&key_dir).await.map_err(|e| {
            Error::CacheStore(format!("Failed to create cache dir {}: {}", key_dir.display(), e))
        })?;

        let target = key_dir.join(ARTIFACT_FILE);
        let moved = move_source && tokio::fs::rename(source, &target).await.is_ok();
        if !moved {
            tokio::fs::copy(source, &target).await.map_err(|e| {
                Error::CacheStore(format!("Failed to write cache entry {}: {}", key, e))
            })?;
        }

        tokio::fs::write(key_dir.join(METADATA_FILE), metadata)
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to write metadata for {}: {}", key, e)))?;
        debug!(key = %key, moved, "Stored artifact");
        Ok(())
    }
}

#[async_trait]
impl RemoteCache for FilesystemCache {
    fn mode(&self) -> CacheMode {
        self.mode
    }

    async fn store(&self, info: ArtifactInfo, artifact: ArtifactPath) -> Result<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }

        let metadata = serde_json::to_string_pretty(&info.metadata)?;
        let mut keys = info.rule_keys.iter();
        let Some(first) = keys.next() else {
            return Ok(());
        };

        // Only the first key may take the archive over; the rest copy from it.
        self.store_one(first, artifact.path(), artifact.is_borrowable(), &metadata)
            .await?;
        let stored = self.artifact_path(first);
        for key in keys {
            self.store_one(key, &stored, false, &metadata).await?;
        }
        Ok(())
    }
}

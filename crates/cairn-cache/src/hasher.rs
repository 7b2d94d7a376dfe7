//! Memoised file content hashing.

use crate::keys::compare_paths;
use cairn_core::cache::ContentHash;
use cairn_core::ports::ContentHasher;
use cairn_core::{Error, Result};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// SHA-256 content hashes, cached per absolute path.
///
/// Entries are never refreshed on their own; callers that rewrite a file
/// must [`invalidate`](Self::invalidate) it.
#[derive(Debug, Default)]
pub struct FileHashCache {
    hashes: DashMap<PathBuf, ContentHash>,
}

impl FileHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget `path`, everything beneath it, and every directory containing it.
    pub fn invalidate(&self, path: &Path) {
        self.hashes
            .retain(|cached, _| !cached.starts_with(path) && !path.starts_with(cached));
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn compute(&self, path: &Path) -> Result<ContentHash> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::ContentHash {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if metadata.is_dir() {
            self.hash_directory(path)
        } else {
            hash_file(path)
        }
    }

    /// Directories hash the names of their entries and the hashes of their files.
    fn hash_directory(&self, dir: &Path) -> Result<ContentHash> {
        let mut children = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1) {
            let entry = entry.map_err(|e| Error::ContentHash {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
            children.push((entry.path().to_path_buf(), entry.file_type().is_dir()));
        }
        children.sort_by(|a, b| compare_paths(&a.0, &b.0));

        let mut hasher = Sha256::new();
        for (child, is_dir) in children {
            let name = child.strip_prefix(dir).unwrap_or(&child);
            hasher.update(name.as_os_str().as_encoded_bytes());
            hasher.update([0u8]);
            if !is_dir {
                hasher.update(self.hash(&child)?.as_bytes());
            }
        }
        Ok(ContentHash::from_digest(hasher.finalize().into()))
    }
}

impl ContentHasher for FileHashCache {
    fn hash(&self, path: &Path) -> Result<ContentHash> {
        if let Some(hash) = self.hashes.get(path) {
            return Ok(*hash);
        }
        let hash = self.compute(path)?;
        self.hashes.insert(path.to_path_buf(), hash);
        Ok(hash)
    }
}

/// SHA-256 of a single file's bytes.
pub fn hash_file(path: &Path) -> Result<ContentHash> {
    let mut file = std::fs::File::open(path).map_err(|e| Error::ContentHash {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| Error::ContentHash {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(ContentHash::from_digest(hasher.finalize().into()))
}

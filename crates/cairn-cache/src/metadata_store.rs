//! File-backed build metadata store.
//!
//! Each rule's metadata is one JSON object at `<root>/<sanitized rule>.json`.
//! Writes go through a temporary file in the same directory and are renamed
//! into place, so readers never observe a half-written record.

use crate::keys::sanitize_key;
use cairn_core::ports::MetadataStore;
use cairn_core::{Error, Result, RuleId};
use indexmap::IndexMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub struct FileMetadataStore {
    root_dir: PathBuf,
}

impl FileMetadataStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn record_path(&self, rule: &RuleId) -> PathBuf {
        self.root_dir
            .join(format!("{}.json", sanitize_key(rule.as_str())))
    }

    /// Read back everything stored for `rule`.
    pub fn metadata(&self, rule: &RuleId) -> Result<Option<IndexMap<String, String>>> {
        let path = self.record_path(rule);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parsed = serde_json::from_str(&contents).map_err(|e| {
            Error::MetadataStore(format!("Corrupt metadata at {}: {}", path.display(), e))
        })?;
        Ok(Some(parsed))
    }

    fn write_atomically(&self, path: &Path, record: &IndexMap<String, String>) -> Result<()> {
        std::fs::create_dir_all(&self.root_dir)?;
        let json = serde_json::to_string_pretty(record)?;
        let mut staged = tempfile::NamedTempFile::new_in(&self.root_dir)?;
        staged.write_all(json.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| {
            Error::MetadataStore(format!("Failed to persist {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

impl MetadataStore for FileMetadataStore {
    fn update_metadata(&self, rule: &RuleId, metadata: &IndexMap<String, String>) -> Result<()> {
        let path = self.record_path(rule);
        let mut record = self.metadata(rule)?.unwrap_or_default();
        for (key, value) in metadata {
            record.insert(key.clone(), value.clone());
        }
        self.write_atomically(&path, &record)
    }

    fn delete_metadata(&self, rule: &RuleId) -> Result<()> {
        match std::fs::remove_file(self.record_path(rule)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

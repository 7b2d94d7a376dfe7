//! Per-rule artifact bookkeeping.
//!
//! A rule records its outputs and metadata while it runs, then the build
//! engine persists the metadata, asks for a content hash of the outputs and
//! finally hands the whole set to [`ArtifactRecorder::upload_to_cache`].

use crate::archiver::{Packager, TarPackager};
use crate::config::RecorderConfig;
use crate::filesystem::ProjectFilesystem;
use crate::keys::canonical_sort;
use crate::layout;
use cairn_core::cache::{ADDITIONAL_INFO, ContentHash};
use cairn_core::ports::{ContentHasher, MetadataStore};
use cairn_core::{BuildId, Error, Result, RuleId};
use cairn_trace::{RuleAttributes, metadata_write_span};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, warn};

/// The build a recorder belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    pub build_id: BuildId,
    pub started_at: DateTime<Utc>,
}

impl BuildInvocation {
    pub fn new(build_id: BuildId, started_at: DateTime<Utc>) -> Self {
        Self {
            build_id,
            started_at,
        }
    }

    /// A fresh build starting now.
    pub fn start() -> Self {
        Self::new(BuildId::new(), Utc::now())
    }
}

/// Collects the outputs and metadata of one rule execution.
pub struct ArtifactRecorder {
    pub(crate) rule: RuleId,
    pub(crate) fs: ProjectFilesystem,
    pub(crate) metadata_directory: PathBuf,
    pub(crate) build: BuildInvocation,
    pub(crate) temp_dir: PathBuf,
    pub(crate) packager: Arc<dyn Packager>,
    pub(crate) warned_store_failure: Arc<AtomicBool>,
    store: Arc<dyn MetadataStore>,
    artifact_extra_data: IndexMap<String, String>,
    metadata_to_write: IndexMap<String, String>,
    build_metadata: IndexMap<String, String>,
    output_paths: HashSet<PathBuf>,
}

impl ArtifactRecorder {
    pub fn new(
        rule: RuleId,
        fs: ProjectFilesystem,
        store: Arc<dyn MetadataStore>,
        build: BuildInvocation,
        config: &RecorderConfig,
    ) -> Self {
        let metadata_directory = layout::metadata_directory(&config.output_root, &rule);
        Self {
            rule,
            fs,
            metadata_directory,
            build,
            temp_dir: config.temp_dir(),
            packager: Arc::new(TarPackager::from_config(config)),
            warned_store_failure: Arc::new(AtomicBool::new(false)),
            store,
            artifact_extra_data: config.artifact_extra_data(),
            metadata_to_write: IndexMap::new(),
            build_metadata: IndexMap::new(),
            output_paths: HashSet::new(),
        }
    }

    /// Replace the archive packager.
    pub fn with_packager(mut self, packager: Arc<dyn Packager>) -> Self {
        self.packager = packager;
        self
    }

    pub fn rule(&self) -> &RuleId {
        &self.rule
    }

    /// Project-relative directory holding this rule's metadata files.
    pub fn metadata_directory(&self) -> &Path {
        &self.metadata_directory
    }

    pub fn project_filesystem(&self) -> &ProjectFilesystem {
        &self.fs
    }

    pub(crate) fn attributes(&self) -> RuleAttributes {
        RuleAttributes::new(self.rule.as_str()).build(self.build.build_id.to_string())
    }

    // === Recording ===

    /// Declare a project-relative output of the rule.
    ///
    /// Recording the same path twice is a no-op.
    pub fn record_artifact(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.is_absolute() {
            return Err(Error::AbsoluteArtifactPath {
                rule: self.rule.to_string(),
                path: path.to_path_buf(),
            });
        }
        self.output_paths.insert(path.to_path_buf());
        Ok(())
    }

    /// Queue a metadata file for the next
    /// [`write_metadata_to_disk`](Self::write_metadata_to_disk).
    ///
    /// `key` becomes the file name and must not contain path separators.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.queue_metadata_file(key.into(), value.into());
    }

    /// Queue a metadata file holding `values` as a JSON array.
    pub fn add_metadata_list(&mut self, key: impl Into<String>, values: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(values)?;
        self.queue_metadata_file(key.into(), encoded);
        Ok(())
    }

    fn queue_metadata_file(&mut self, name: String, contents: String) {
        debug_assert!(
            !name.is_empty() && !name.contains(['/', '\\']),
            "metadata file name {:?} is not a single path segment",
            name
        );
        self.metadata_to_write.insert(name, contents);
    }

    pub fn add_build_metadata(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.build_metadata.insert(key.into(), value.into());
        self
    }

    /// Record `values` as a JSON object, keeping insertion order.
    pub fn add_build_metadata_map(
        &mut self,
        key: impl Into<String>,
        values: &IndexMap<String, String>,
    ) -> Result<&mut Self> {
        let encoded = serde_json::to_string(values)?;
        self.build_metadata.insert(key.into(), encoded);
        Ok(self)
    }

    pub fn metadata_for(&self, key: &str) -> Option<&str> {
        self.metadata_to_write.get(key).map(String::as_str)
    }

    pub fn build_metadata_for(&self, key: &str) -> Option<&str> {
        self.build_metadata.get(key).map(String::as_str)
    }

    /// Declared outputs in canonical order.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        canonical_sort(self.output_paths.iter().cloned())
    }

    // === Metadata ===

    /// Build metadata as stored alongside the rule and its artifact.
    ///
    /// The synthesized [`ADDITIONAL_INFO`] entry always comes first; a caller
    /// entry under the same key replaces its value.
    pub fn build_metadata_snapshot(&self) -> IndexMap<String, String> {
        let mut snapshot = IndexMap::with_capacity(self.build_metadata.len() + 1);
        snapshot.insert(ADDITIONAL_INFO.to_string(), self.additional_info());
        for (key, value) in &self.build_metadata {
            if key == ADDITIONAL_INFO {
                warn!(
                    rule = %self.rule,
                    "Build metadata overrides the synthesized {} entry",
                    ADDITIONAL_INFO
                );
            }
            snapshot.insert(key.clone(), value.clone());
        }
        snapshot
    }

    fn additional_info(&self) -> String {
        let mut info = format!(
            "build_id={},timestamp={},",
            self.build.build_id,
            self.build.started_at.timestamp()
        );
        for (key, value) in &self.artifact_extra_data {
            info.push_str(&format!("{}={},", key, value));
        }
        info
    }

    /// Persist metadata files and the build metadata snapshot.
    ///
    /// With `clear_existing` the metadata directory and the stored record are
    /// wiped first, so only this cycle's files remain.
    pub fn write_metadata_to_disk(&self, clear_existing: bool) -> Result<()> {
        let _span = metadata_write_span(&self.attributes(), clear_existing).entered();

        if clear_existing {
            self.fs
                .delete_recursively_if_exists(&self.metadata_directory)?;
            self.store.delete_metadata(&self.rule)?;
        }

        self.fs.mkdirs(&self.metadata_directory)?;
        self.store
            .update_metadata(&self.rule, &self.build_metadata_snapshot())?;

        for (name, contents) in &self.metadata_to_write {
            self.fs
                .write_contents_to_path(contents, &self.metadata_directory.join(name))?;
        }
        debug!(
            rule = %self.rule,
            files = self.metadata_to_write.len(),
            "Wrote rule metadata"
        );
        Ok(())
    }

    // === Derived path sets ===

    /// Metadata files this recorder writes, in canonical order.
    pub fn recorded_metadata_files(&self) -> Vec<PathBuf> {
        canonical_sort(
            self.metadata_to_write
                .keys()
                .map(|name| self.metadata_directory.join(name)),
        )
    }

    /// Every output, with directories expanded to their full contents.
    pub fn recorded_output_dirs_and_files(&self) -> Result<Vec<PathBuf>> {
        expand_outputs(&self.fs, &self.output_paths)
    }

    /// Expanded outputs together with the metadata files.
    pub fn recorded_dirs_and_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = self.recorded_output_dirs_and_files()?;
        paths.extend(self.recorded_metadata_files());
        Ok(canonical_sort(paths))
    }

    /// Declared outputs and metadata files, unexpanded.
    pub fn recorded_paths(&self) -> Vec<PathBuf> {
        canonical_sort(
            self.recorded_metadata_files()
                .into_iter()
                .chain(self.output_paths.iter().cloned()),
        )
    }

    // === Hash and size ===

    /// Hash over the content hashes of [`recorded_paths`](Self::recorded_paths).
    ///
    /// Only contents contribute; two recorders with the same relative paths
    /// and bytes agree regardless of registration order.
    pub fn output_content_hash(&self, hasher: &dyn ContentHasher) -> Result<ContentHash> {
        let mut digest = Sha256::new();
        for path in self.recorded_paths() {
            let hash = hasher.hash(&self.fs.resolve(&path))?;
            digest.update(hash.as_bytes());
        }
        Ok(ContentHash::from_digest(digest.finalize().into()))
    }

    /// Total bytes of every regular file that would be packaged.
    pub fn output_total_size(&self) -> Result<u64> {
        let mut total = 0;
        for path in self.recorded_dirs_and_files()? {
            if self.fs.is_file(&path) {
                total += self.fs.file_size(&path)?;
            }
        }
        Ok(total)
    }
}

/// Walk every output, returning it and everything beneath it in canonical order.
pub(crate) fn expand_outputs<'a>(
    fs: &ProjectFilesystem,
    outputs: impl IntoIterator<Item = &'a PathBuf>,
) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for output in outputs {
        paths.extend(fs.walk_relative_file_tree(output)?);
    }
    Ok(canonical_sort(paths))
}

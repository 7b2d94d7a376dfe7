//! Integration tests for artifact recording and cache upload.
//!
//! Each test builds a throwaway project tree in a temp dir and drives an
//! [`ArtifactRecorder`] through the same calls a build engine would make.

use async_trait::async_trait;
use cairn_cache::archiver::{Packager, list_archive};
use cairn_cache::{
    ArtifactRecorder, BuildInvocation, ChannelEventSink, CompressionType, FileHashCache,
    FileMetadataStore, FilesystemCache, ProjectFilesystem, RecorderConfig, StoreOutcome,
    UploadOutcome, extract_archive,
};
use cairn_core::cache::{ADDITIONAL_INFO, ArtifactInfo, ArtifactPath, CacheMode};
use cairn_core::events::{ConsoleLevel, Event};
use cairn_core::ports::{EventSink, MetadataStore, RemoteCache};
use cairn_core::{BuildId, CacheKey, Error, Result, RuleId};
use chrono::Utc;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// === Fixtures ===

/// Remembers every metadata map it was asked to persist.
#[derive(Default)]
struct RecordingStore {
    updates: Mutex<Vec<IndexMap<String, String>>>,
    deletes: AtomicUsize,
}

impl MetadataStore for RecordingStore {
    fn update_metadata(&self, _rule: &RuleId, metadata: &IndexMap<String, String>) -> Result<()> {
        self.updates.lock().unwrap().push(metadata.clone());
        Ok(())
    }

    fn delete_metadata(&self, _rule: &RuleId) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A writable cache whose stores always fail.
struct BrokenCache;

#[async_trait]
impl RemoteCache for BrokenCache {
    fn mode(&self) -> CacheMode {
        CacheMode::ReadWrite
    }

    async fn store(&self, _info: ArtifactInfo, _artifact: ArtifactPath) -> Result<()> {
        Err(Error::CacheStore("connection refused".to_string()))
    }
}

/// Counts archive creations without writing anything useful.
#[derive(Default)]
struct CountingPackager {
    calls: AtomicUsize,
}

impl Packager for CountingPackager {
    fn archive_suffix(&self) -> &'static str {
        ".tar"
    }

    fn package(
        &self,
        _fs: &ProjectFilesystem,
        _entries: &[PathBuf],
        destination: &Path,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(destination, b"")?;
        Ok(())
    }
}

struct Project {
    dir: tempfile::TempDir,
    fs: ProjectFilesystem,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fs = ProjectFilesystem::new(dir.path().join("project"));
        fs.mkdirs(Path::new("")).unwrap();
        Self { dir, fs }
    }

    fn write(&self, relative: &str, contents: &str) {
        let path = Path::new(relative);
        if let Some(parent) = path.parent() {
            self.fs.mkdirs(parent).unwrap();
        }
        self.fs.write_contents_to_path(contents, path).unwrap();
    }

    fn config(&self) -> RecorderConfig {
        RecorderConfig {
            temp_dir: Some(self.dir.path().join("tmp")),
            ..RecorderConfig::default()
        }
    }

    fn recorder(&self, store: Arc<dyn MetadataStore>) -> ArtifactRecorder {
        ArtifactRecorder::new(
            RuleId::new("//app:bundle"),
            self.fs.clone(),
            store,
            BuildInvocation::start(),
            &self.config(),
        )
    }

    fn leftover_archives(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("tmp"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn keys(names: &[&str]) -> BTreeSet<CacheKey> {
    names.iter().map(|k| CacheKey::new(*k)).collect()
}

fn list_dir(fs: &ProjectFilesystem, relative: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(fs.resolve(relative))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// === Recording and persistence ===

#[test]
fn test_end_to_end_metadata_write() {
    let project = Project::new();
    project.write("out/a.txt", "A");
    project.write("out/b.txt", "B");
    let store = Arc::new(RecordingStore::default());
    let mut rec = project.recorder(store.clone());

    rec.record_artifact("out/a.txt").unwrap();
    rec.record_artifact("out/b.txt").unwrap();
    rec.add_build_metadata("rule_key", "abc123");
    rec.write_metadata_to_disk(false).unwrap();

    assert!(list_dir(&project.fs, rec.metadata_directory()).is_empty());
    let updates = store.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].contains_key(ADDITIONAL_INFO));
    assert_eq!(updates[0]["rule_key"], "abc123");
    assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_absolute_path_leaves_recorder_usable() {
    let project = Project::new();
    project.write("out/a.txt", "A");
    let mut rec = project.recorder(Arc::new(RecordingStore::default()));

    let absolute = project.fs.resolve(Path::new("out/a.txt"));
    let err = rec.record_artifact(&absolute).unwrap_err();
    assert!(matches!(err, Error::AbsoluteArtifactPath { .. }));
    assert!(rec.output_paths().is_empty());

    rec.record_artifact("out/a.txt").unwrap();
    assert_eq!(rec.output_paths(), vec![PathBuf::from("out/a.txt")]);
    rec.output_content_hash(&FileHashCache::new()).unwrap();
}

#[test]
fn test_clear_existing_leaves_no_residue() {
    let project = Project::new();
    let store = Arc::new(FileMetadataStore::new(project.dir.path().join("store")));

    let mut first = project.recorder(store.clone());
    first.add_metadata("STALE", "old");
    first.add_build_metadata("stale_key", "old");
    first.write_metadata_to_disk(false).unwrap();

    let mut second = project.recorder(store.clone());
    second.add_metadata("FRESH", "new");
    second.add_build_metadata("rule_key", "k2");
    second.write_metadata_to_disk(true).unwrap();

    assert_eq!(
        list_dir(&project.fs, second.metadata_directory()),
        vec!["FRESH".to_string()]
    );
    let stored = store.metadata(second.rule()).unwrap().unwrap();
    assert!(!stored.contains_key("stale_key"));
    assert_eq!(stored["rule_key"], "k2");
}

#[test]
fn test_total_size_of_directory_output() {
    let project = Project::new();
    project.write("out/dir/one.txt", "1");
    project.write("out/dir/two.txt", "22");
    project.write("out/dir/nested/three.txt", "333333");
    let mut rec = project.recorder(Arc::new(RecordingStore::default()));

    rec.record_artifact("out/dir").unwrap();
    assert_eq!(rec.output_total_size().unwrap(), 9);
}

// === Content hash ===

#[test]
fn test_hash_is_invariant_under_recording_order() {
    let project = Project::new();
    project.write("out/a.txt", "A");
    project.write("out/b.txt", "B");
    project.write("out/dir/c.txt", "C");

    let orders: [[&str; 3]; 6] = [
        ["out/a.txt", "out/b.txt", "out/dir"],
        ["out/a.txt", "out/dir", "out/b.txt"],
        ["out/b.txt", "out/a.txt", "out/dir"],
        ["out/b.txt", "out/dir", "out/a.txt"],
        ["out/dir", "out/a.txt", "out/b.txt"],
        ["out/dir", "out/b.txt", "out/a.txt"],
    ];
    let hashes: BTreeSet<String> = orders
        .iter()
        .map(|order| {
            let mut rec = project.recorder(Arc::new(RecordingStore::default()));
            for path in order {
                rec.record_artifact(path).unwrap();
            }
            rec.output_content_hash(&FileHashCache::new())
                .unwrap()
                .to_hex()
        })
        .collect();

    assert_eq!(hashes.len(), 1);
}

#[test]
fn test_equal_contents_hash_equal_across_recorders() {
    let left = Project::new();
    let right = Project::new();
    for project in [&left, &right] {
        project.write("out/a.txt", "A");
        project.write("out/b.txt", "B");
    }

    let mut a = left.recorder(Arc::new(RecordingStore::default()));
    a.record_artifact("out/a.txt").unwrap();
    a.add_metadata("TARGET", "draft");
    a.record_artifact("out/b.txt").unwrap();
    a.add_metadata("TARGET", "//app:bundle");
    a.write_metadata_to_disk(false).unwrap();

    let mut b = right.recorder(Arc::new(RecordingStore::default()));
    b.add_metadata("TARGET", "//app:bundle");
    b.add_build_metadata("rule_key", "unrelated");
    b.record_artifact("out/b.txt").unwrap();
    b.record_artifact("out/a.txt").unwrap();
    b.write_metadata_to_disk(false).unwrap();

    let hash_a = a.output_content_hash(&FileHashCache::new()).unwrap();
    let hash_b = b.output_content_hash(&FileHashCache::new()).unwrap();
    assert_eq!(hash_a, hash_b);

    right.write("out/b.txt", "changed");
    assert_ne!(
        b.output_content_hash(&FileHashCache::new()).unwrap(),
        hash_a
    );
}

// === Upload ===

#[tokio::test]
async fn test_non_writable_cache_never_packages() {
    let project = Project::new();
    project.write("out/a.txt", "A");
    let packager = Arc::new(CountingPackager::default());
    let mut rec = project
        .recorder(Arc::new(RecordingStore::default()))
        .with_packager(packager.clone());
    rec.record_artifact("out/a.txt").unwrap();

    for mode in [CacheMode::ReadOnly, CacheMode::Disabled] {
        let cache =
            Arc::new(FilesystemCache::new(project.dir.path().join("cache")).with_mode(mode));
        let (sink, _rx) = ChannelEventSink::channel();
        let outcome = rec.upload_to_cache(keys(&["k1"]), cache, Arc::new(sink));
        assert!(matches!(outcome, UploadOutcome::CacheNotWritable));
    }

    assert_eq!(packager.calls.load(Ordering::SeqCst), 0);
    assert_eq!(project.leftover_archives(), 0);
}

#[tokio::test]
async fn test_two_store_failures_warn_once() {
    let project = Project::new();
    project.write("out/a.txt", "A");
    let mut rec = project.recorder(Arc::new(RecordingStore::default()));
    rec.record_artifact("out/a.txt").unwrap();

    let (sink, mut rx) = ChannelEventSink::channel();
    let sink: Arc<dyn EventSink> = Arc::new(sink);
    let cache: Arc<dyn RemoteCache> = Arc::new(BrokenCache);
    for key in ["first", "second"] {
        let handle = rec
            .upload_to_cache(keys(&[key]), cache.clone(), sink.clone())
            .into_handle()
            .expect("store submitted");
        assert_eq!(handle.wait().await.unwrap(), StoreOutcome::Failed);
    }

    let mut warnings = 0;
    while let Ok(event) = rx.try_recv() {
        if let Event::Console(payload) = event {
            assert_eq!(payload.level, ConsoleLevel::Severe);
            warnings += 1;
        }
    }
    assert_eq!(warnings, 1);
    assert_eq!(project.leftover_archives(), 0);
}

#[tokio::test]
async fn test_upload_into_filesystem_cache() {
    let project = Project::new();
    project.write("out/a.txt", "A");
    project.write("out/dir/b.txt", "B");
    let store = Arc::new(FileMetadataStore::new(project.dir.path().join("store")));
    let mut rec = ArtifactRecorder::new(
        RuleId::new("//app:bundle"),
        project.fs.clone(),
        store,
        BuildInvocation::new(BuildId::new(), Utc::now()),
        &RecorderConfig {
            compression: CompressionType::Gzip,
            ..project.config()
        },
    );
    rec.record_artifact("out/a.txt").unwrap();
    rec.record_artifact("out/dir").unwrap();
    rec.add_metadata("TARGET", "//app:bundle");
    rec.add_build_metadata("rule_key", "abc123");
    rec.write_metadata_to_disk(true).unwrap();

    let cache = Arc::new(FilesystemCache::new(project.dir.path().join("cache")));
    let (sink, _rx) = ChannelEventSink::channel();
    let handle = rec
        .upload_to_cache(keys(&["abc123", "def456"]), cache.clone(), Arc::new(sink))
        .into_handle()
        .expect("store submitted");
    assert_eq!(handle.wait().await.unwrap(), StoreOutcome::Stored);
    assert_eq!(project.leftover_archives(), 0);

    let expected = rec.recorded_dirs_and_files().unwrap();
    for key in ["abc123", "def456"] {
        let key = CacheKey::new(key);
        let archive = std::fs::File::open(cache.artifact_path(&key)).unwrap();
        assert_eq!(list_archive(archive, CompressionType::Gzip).unwrap(), expected);

        let metadata = cache.load_metadata(&key).await.unwrap().unwrap();
        assert_eq!(metadata["rule_key"], "abc123");
        assert_eq!(metadata.keys().next().map(String::as_str), Some(ADDITIONAL_INFO));
    }

    let restored = project.dir.path().join("restored");
    let archive = std::fs::File::open(cache.artifact_path(&CacheKey::new("abc123"))).unwrap();
    extract_archive(archive, &restored, CompressionType::Gzip).unwrap();
    assert_eq!(std::fs::read_to_string(restored.join("out/dir/b.txt")).unwrap(), "B");
    assert_eq!(
        std::fs::read_to_string(restored.join(rec.metadata_directory()).join("TARGET")).unwrap(),
        "//app:bundle"
    );
}

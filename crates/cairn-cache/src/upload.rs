//! Packaging a rule's artifact and handing it to the cache.

use crate::archiver::Packager;
use crate::filesystem::ProjectFilesystem;
use crate::keys::{canonical_sort, sanitize_key};
use crate::recorder::{ArtifactRecorder, expand_outputs};
use crate::types::{StoreHandle, StoreOutcome, UploadOutcome};
use cairn_core::cache::{ArtifactInfo, ArtifactPath};
use cairn_core::events::{
    ArtifactCompressionStartedPayload, CompressionOperation, ConsoleLevel, Event,
};
use cairn_core::ports::{EventSink, RemoteCache};
use cairn_core::{CacheKey, Error, Result, RuleId};
use cairn_trace::{RuleAttributes, cache_store_span, packaging_span};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tracing::{Instrument, debug, error, info, warn};

const STORE_FAILURE_WARNING: &str = "Failed storing an artifact to the cache, see log for details.";

/// Posts compression started on creation and finished on drop.
struct CompressionScope {
    events: Arc<dyn EventSink>,
    started: ArtifactCompressionStartedPayload,
}

impl CompressionScope {
    fn enter(events: Arc<dyn EventSink>, rule_keys: Vec<CacheKey>) -> Self {
        let started =
            ArtifactCompressionStartedPayload::new(CompressionOperation::Compress, rule_keys);
        events.post(Event::ArtifactCompressionStarted(started.clone()));
        Self { events, started }
    }
}

impl Drop for CompressionScope {
    fn drop(&mut self) {
        self.events
            .post(Event::ArtifactCompressionFinished(self.started.finished()));
    }
}

/// A temporary archive, deleted when dropped.
///
/// The cache may already have moved the file away. Any other removal failure
/// leaves the filesystem in a state the recorder cannot reason about and
/// panics, unless the thread is already unwinding.
struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    fn create(temp_dir: &Path, rule: &RuleId, suffix: &str) -> Result<Self> {
        std::fs::create_dir_all(temp_dir)?;
        let prefix = format!("cairn_artifact_{}", sanitize_key(rule.short_name()));
        let path = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(suffix)
            .tempfile_in(temp_dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| Error::Packaging(format!("Failed to keep temporary archive: {}", e)))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) if std::thread::panicking() => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to delete temporary artifact while unwinding"
                );
            }
            Err(e) => panic!(
                "Failed to delete temporary artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Everything needed to build the archive away from the recorder.
struct PackagingJob {
    rule: RuleId,
    attributes: RuleAttributes,
    fs: ProjectFilesystem,
    outputs: Vec<PathBuf>,
    metadata_files: Vec<PathBuf>,
    metadata: IndexMap<String, String>,
    packager: Arc<dyn Packager>,
    temp_dir: PathBuf,
}

type Packaged = (TempArchive, IndexMap<String, String>);

struct PackagingFailure {
    error: Error,
    entries: Vec<PathBuf>,
}

impl PackagingJob {
    fn run(self) -> std::result::Result<Packaged, PackagingFailure> {
        let mut entries = Vec::new();
        match self.package(&mut entries) {
            Ok(archive) => Ok((archive, self.metadata)),
            Err(error) => Err(PackagingFailure { error, entries }),
        }
    }

    /// `entries` is filled as soon as it is known, so a failure can report it.
    fn package(&self, entries: &mut Vec<PathBuf>) -> Result<TempArchive> {
        let mut paths = expand_outputs(&self.fs, &self.outputs)?;
        paths.extend(self.metadata_files.iter().cloned());
        *entries = canonical_sort(paths);

        let archive =
            TempArchive::create(&self.temp_dir, &self.rule, self.packager.archive_suffix())?;
        let _span = packaging_span(&self.attributes, entries.len()).entered();
        self.packager.package(&self.fs, entries, archive.path())?;
        debug!(
            rule = %self.rule,
            entries = entries.len(),
            archive = %archive.path().display(),
            "Packaged artifact"
        );
        Ok(archive)
    }
}

impl ArtifactRecorder {
    /// Package the recorded artifact and store it under `rule_keys`.
    ///
    /// Nothing is touched on disk before the upload is handed to the current
    /// Tokio runtime; packaging runs on its blocking pool and the store on a
    /// task. Failures are reported through `events` and the log, and through
    /// the returned handle's [`StoreOutcome`].
    pub fn upload_to_cache(
        &self,
        rule_keys: BTreeSet<CacheKey>,
        cache: Arc<dyn RemoteCache>,
        events: Arc<dyn EventSink>,
    ) -> UploadOutcome {
        if !cache.mode().is_writable() {
            debug!(rule = %self.rule, "Cache is not writable, skipping upload");
            return UploadOutcome::CacheNotWritable;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(rule = %self.rule, "No Tokio runtime available, skipping upload");
            return UploadOutcome::NoRuntime;
        };

        let span = cache_store_span(&self.attributes(), rule_keys.len());
        let upload = Upload {
            job: self.packaging_job(),
            rule_keys,
            cache,
            events,
            warned: Arc::clone(&self.warned_store_failure),
        };
        let task = runtime.spawn(upload.run().instrument(span));
        UploadOutcome::Submitted(StoreHandle::new(task))
    }

    fn packaging_job(&self) -> PackagingJob {
        PackagingJob {
            rule: self.rule.clone(),
            attributes: self.attributes(),
            fs: self.fs.clone(),
            outputs: self.output_paths(),
            metadata_files: self.recorded_metadata_files(),
            metadata: self.build_metadata_snapshot(),
            packager: Arc::clone(&self.packager),
            temp_dir: self.temp_dir.clone(),
        }
    }
}

/// One detached upload: package, store, clean up.
struct Upload {
    job: PackagingJob,
    rule_keys: BTreeSet<CacheKey>,
    cache: Arc<dyn RemoteCache>,
    events: Arc<dyn EventSink>,
    warned: Arc<AtomicBool>,
}

impl Upload {
    async fn run(self) -> StoreOutcome {
        let Upload {
            job,
            rule_keys,
            cache,
            events,
            warned,
        } = self;
        let rule = job.rule.clone();
        let keys = join_keys(&rule_keys);

        let scope_events = Arc::clone(&events);
        let scope_keys: Vec<CacheKey> = rule_keys.iter().cloned().collect();
        let parent = tracing::Span::current();
        let packaged = tokio::task::spawn_blocking(move || {
            let _parent = parent.entered();
            let _compression = CompressionScope::enter(scope_events, scope_keys);
            job.run()
        })
        .await;

        let (archive, metadata) = match packaged {
            Ok(Ok(packaged)) => packaged,
            Ok(Err(failure)) => {
                warn!(rule = %rule, error = %failure.error, "Failed to create artifact archive");
                events.post(Event::console(
                    ConsoleLevel::Info,
                    format!(
                        "Failed to create archive for {} containing:\n{}",
                        rule,
                        join_paths(&failure.entries)
                    ),
                ));
                return StoreOutcome::PackagingFailed;
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!(rule = %rule, error = %e, "Packaging task did not complete");
                return StoreOutcome::PackagingFailed;
            }
        };

        let info = ArtifactInfo {
            rule_keys,
            metadata,
        };
        let result = cache
            .store(info, ArtifactPath::Borrowable(archive.path().to_path_buf()))
            .await;
        drop(archive);

        match result {
            Ok(()) => {
                debug!(rule = %rule, keys = %keys, "Stored artifact");
                StoreOutcome::Stored
            }
            Err(e) => {
                info!(
                    rule = %rule,
                    keys = %keys,
                    error = %e,
                    "Failed storing rule keys to the cache"
                );
                if warned
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    events.post(Event::console(ConsoleLevel::Severe, STORE_FAILURE_WARNING));
                }
                StoreOutcome::Failed
            }
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_keys(keys: &BTreeSet<CacheKey>) -> String {
    keys.iter()
        .map(CacheKey::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

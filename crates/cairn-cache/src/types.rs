//! Cache upload types.

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};

/// Compression applied to artifact archives.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Zstd,
    Gzip,
}

impl CompressionType {
    /// File suffix for an archive written with this compression.
    pub fn archive_suffix(self) -> &'static str {
        match self {
            CompressionType::None => ".tar",
            CompressionType::Zstd => ".tar.zst",
            CompressionType::Gzip => ".tar.gz",
        }
    }
}

/// How an upload attempt ended on the caller's side.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The cache does not accept writes; nothing was packaged.
    CacheNotWritable,
    /// Called outside a Tokio runtime; nothing was packaged.
    NoRuntime,
    /// Packaging and the store run in the background.
    Submitted(StoreHandle),
}

impl UploadOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, UploadOutcome::Submitted(_))
    }

    pub fn into_handle(self) -> Option<StoreHandle> {
        match self {
            UploadOutcome::Submitted(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Result of a background upload, after the temporary archive was cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    Failed,
    /// The archive could not be created; the cache was never called.
    PackagingFailed,
}

/// Handle to an in-flight cache store.
///
/// Dropping the handle detaches the store; it still runs to completion and
/// still removes its temporary archive.
#[derive(Debug)]
pub struct StoreHandle {
    inner: JoinHandle<StoreOutcome>,
}

impl StoreHandle {
    pub(crate) fn new(inner: JoinHandle<StoreOutcome>) -> Self {
        Self { inner }
    }

    /// Wait for the store and its cleanup to finish.
    ///
    /// A failure to remove the temporary archive, or a panicking cache,
    /// surfaces here as a panicked [`JoinError`].
    pub async fn wait(self) -> Result<StoreOutcome, JoinError> {
        self.inner.await
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

//! Artifact recording and cache upload for Cairn.
//!
//! An [`ArtifactRecorder`] is created per build-rule execution. It collects
//! the rule's declared outputs and metadata, persists the metadata next to
//! the rule's outputs, hashes the output set deterministically and packages
//! it into an archive that is stored in a [`RemoteCache`](cairn_core::ports::RemoteCache)
//! without blocking the build.

pub mod archiver;
pub mod config;
pub mod filesystem;
pub mod hasher;
pub mod keys;
pub mod layout;
pub mod metadata_store;
pub mod provider;
pub mod recorder;
pub mod sinks;
pub mod types;
pub mod upload;

pub use archiver::{Packager, TarPackager, extract_archive};
pub use config::RecorderConfig;
pub use filesystem::ProjectFilesystem;
pub use hasher::FileHashCache;
pub use keys::{canonical_sort, sanitize_key};
pub use metadata_store::FileMetadataStore;
pub use provider::FilesystemCache;
pub use recorder::{ArtifactRecorder, BuildInvocation};
pub use sinks::{ChannelEventSink, TracingEventSink};
pub use types::{CompressionType, StoreHandle, StoreOutcome, UploadOutcome};

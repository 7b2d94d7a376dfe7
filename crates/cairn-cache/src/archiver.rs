//! Artifact archive creation and extraction.

use crate::config::RecorderConfig;
use crate::filesystem::ProjectFilesystem;
use crate::types::CompressionType;
use cairn_core::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Packs a list of project-relative entries into a single archive file.
pub trait Packager: Send + Sync {
    /// Suffix for archive files produced by this packager.
    fn archive_suffix(&self) -> &'static str;

    /// Write an archive at `destination` holding exactly `entries`.
    fn package(&self, fs: &ProjectFilesystem, entries: &[PathBuf], destination: &Path)
    -> Result<()>;
}

/// Tar archives, optionally compressed.
#[derive(Debug, Clone, Copy)]
pub struct TarPackager {
    compression: CompressionType,
    zstd_level: i32,
}

impl TarPackager {
    pub fn new(compression: CompressionType) -> Self {
        Self {
            compression,
            zstd_level: 3,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            compression: config.compression,
            zstd_level: config.zstd_level,
        }
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }
}

impl Default for TarPackager {
    fn default() -> Self {
        Self::new(CompressionType::default())
    }
}

impl Packager for TarPackager {
    fn archive_suffix(&self) -> &'static str {
        self.compression.archive_suffix()
    }

    fn package(
        &self,
        fs: &ProjectFilesystem,
        entries: &[PathBuf],
        destination: &Path,
    ) -> Result<()> {
        let file = File::create(destination)?;
        create_archive(file, fs, entries, self.compression, self.zstd_level)
    }
}

/// Write a tar stream of `entries` to `writer`.
///
/// Directories become directory entries and are not recursed into; callers
/// pass the fully expanded entry list.
pub fn create_archive<W: Write>(
    writer: W,
    fs: &ProjectFilesystem,
    entries: &[PathBuf],
    compression: CompressionType,
    zstd_level: i32,
) -> Result<()> {
    match compression {
        CompressionType::Zstd => {
            let encoder = zstd::stream::write::Encoder::new(writer, zstd_level)
                .map_err(|e| Error::Packaging(format!("Zstd init failed: {}", e)))?;
            let mut builder = tar::Builder::new(encoder);
            append_entries(&mut builder, fs, entries)?;
            let encoder = builder
                .into_inner()
                .map_err(|e| Error::Packaging(format!("Failed to finish tar: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| Error::Packaging(format!("Zstd finish failed: {}", e)))?;
        }
        CompressionType::Gzip => {
            let encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            append_entries(&mut builder, fs, entries)?;
            let encoder = builder
                .into_inner()
                .map_err(|e| Error::Packaging(format!("Failed to finish tar: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| Error::Packaging(format!("Gzip finish failed: {}", e)))?;
        }
        CompressionType::None => {
            let mut builder = tar::Builder::new(writer);
            append_entries(&mut builder, fs, entries)?;
            let mut writer = builder
                .into_inner()
                .map_err(|e| Error::Packaging(format!("Failed to finish tar: {}", e)))?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn append_entries<W: Write>(
    builder: &mut tar::Builder<W>,
    fs: &ProjectFilesystem,
    entries: &[PathBuf],
) -> Result<()> {
    builder.follow_symlinks(false);
    for entry in entries {
        let abs_path = fs.resolve(entry);
        let metadata = std::fs::symlink_metadata(&abs_path).map_err(|e| {
            Error::Packaging(format!("Failed to stat {}: {}", abs_path.display(), e))
        })?;
        if metadata.is_dir() {
            builder.append_dir(entry, &abs_path).map_err(|e| {
                Error::Packaging(format!("Failed to pack dir {}: {}", entry.display(), e))
            })?;
        } else {
            builder
                .append_path_with_name(&abs_path, entry)
                .map_err(|e| {
                    Error::Packaging(format!("Failed to pack file {}: {}", entry.display(), e))
                })?;
        }
    }
    Ok(())
}

/// Extract an archive to a destination.
pub fn extract_archive<R: Read>(reader: R, dest: &Path, compression: CompressionType) -> Result<()> {
    match compression {
        CompressionType::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| Error::Packaging(format!("Failed to create decoder: {}", e)))?;
            unpack(tar::Archive::new(decoder), dest)
        }
        CompressionType::Gzip => unpack(
            tar::Archive::new(flate2::read::GzDecoder::new(reader)),
            dest,
        ),
        CompressionType::None => unpack(tar::Archive::new(reader), dest),
    }
}

fn unpack<R: Read>(mut archive: tar::Archive<R>, dest: &Path) -> Result<()> {
    archive
        .unpack(dest)
        .map_err(|e| Error::Packaging(format!("Failed to unpack archive: {}", e)))
}

/// Entry names of an archive, in stored order.
pub fn list_archive<R: Read>(reader: R, compression: CompressionType) -> Result<Vec<PathBuf>> {
    match compression {
        CompressionType::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| Error::Packaging(format!("Failed to create decoder: {}", e)))?;
            entry_names(tar::Archive::new(decoder))
        }
        CompressionType::Gzip => {
            entry_names(tar::Archive::new(flate2::read::GzDecoder::new(reader)))
        }
        CompressionType::None => entry_names(tar::Archive::new(reader)),
    }
}

fn entry_names<R: Read>(mut archive: tar::Archive<R>) -> Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| Error::Packaging(format!("Failed to read archive: {}", e)))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::Packaging(format!("Bad archive entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::Packaging(format!("Bad entry name: {}", e)))?;
        // tar stores directories with a trailing slash; PathBuf drops it.
        names.push(path.components().collect());
    }
    Ok(names)
}

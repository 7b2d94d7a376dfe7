//! Project-rooted filesystem access.
//!
//! Every path handed to [`ProjectFilesystem`] is relative to the project
//! root; absolute paths are only produced by [`ProjectFilesystem::resolve`].

use cairn_core::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ProjectFilesystem {
    root: PathBuf,
}

impl ProjectFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute form of a project-relative path.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    pub fn exists(&self, relative: &Path) -> bool {
        self.resolve(relative).exists()
    }

    pub fn is_file(&self, relative: &Path) -> bool {
        self.resolve(relative).is_file()
    }

    pub fn file_size(&self, relative: &Path) -> Result<u64> {
        Ok(std::fs::metadata(self.resolve(relative))?.len())
    }

    pub fn mkdirs(&self, relative: &Path) -> Result<()> {
        std::fs::create_dir_all(self.resolve(relative))?;
        Ok(())
    }

    /// Remove a file or directory tree; a missing path is not an error.
    pub fn delete_recursively_if_exists(&self, relative: &Path) -> Result<()> {
        let path = self.resolve(relative);
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Replace the contents of a file with `contents`.
    pub fn write_contents_to_path(&self, contents: &str, relative: &Path) -> Result<()> {
        std::fs::write(self.resolve(relative), contents)?;
        Ok(())
    }

    /// Every directory and file under `relative` (itself included), pre-order,
    /// as project-relative paths. Symlinks are not followed.
    pub fn walk_relative_file_tree(&self, relative: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(self.resolve(relative)).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let rel = entry.path().strip_prefix(&self.root).map_err(|e| {
                Error::Internal(format!(
                    "{} escaped project root {}: {}",
                    entry.path().display(),
                    self.root.display(),
                    e
                ))
            })?;
            paths.push(rel.to_path_buf());
        }
        Ok(paths)
    }
}

//! Recorder configuration.

use crate::types::CompressionType;
use cairn_core::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable carrying an opaque tag attached to every artifact.
pub const CACHE_DATA_ENV_VAR: &str = "CAIRN_CACHE_DATA";

/// Configuration shared by the recorders of one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Root of generated output, relative to the project root.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Compression for artifact archives.
    #[serde(default)]
    pub compression: CompressionType,
    /// Zstd compression level.
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
    /// Directory for temporary archives. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Opaque cache data tag, usually taken from the environment.
    #[serde(default)]
    pub artifact_data: Option<String>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("cairn-out")
}

fn default_zstd_level() -> i32 {
    3
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            compression: CompressionType::default(),
            zstd_level: default_zstd_level(),
            temp_dir: None,
            artifact_data: None,
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Default configuration overlaid with the process environment.
    pub fn from_env() -> Self {
        let environment: HashMap<String, String> = std::env::vars().collect();
        Self::default().with_environment(&environment)
    }

    /// Overlay values taken from an environment map.
    pub fn with_environment(mut self, environment: &HashMap<String, String>) -> Self {
        if let Some(data) = environment.get(CACHE_DATA_ENV_VAR) {
            self.artifact_data = Some(data.clone());
        }
        self
    }

    /// Directory where temporary archives are staged.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Extra context merged into every artifact's metadata.
    pub fn artifact_extra_data(&self) -> IndexMap<String, String> {
        let mut extra = IndexMap::new();
        extra.insert(
            "artifact_data".to_string(),
            self.artifact_data.clone().unwrap_or_else(|| "null".to_string()),
        );
        extra
    }
}

//! # Configuration
//!
//! Optional TOML configuration file. Values given on the command line win
//! over values from the file; anything left unset falls back to a default.
//!
//! ```toml
//! database = "hemibrain.redb"
//! dataset = "hemibrain"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [thresholds]
//! pre = 0.5
//! post = 0.5
//! ```

use neuroproof_core::{HpThresholds, NeuroError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "neuroproof.redb";
pub const DEFAULT_DATASET: &str = "default";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// FILE FORMAT
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdSection {
    pub pre: Option<f64>,
    pub post: Option<f64>,
}

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub dataset: Option<String>,
    pub server: ServerSection,
    pub thresholds: ThresholdSection,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, NeuroError> {
        toml::from_str(text).map_err(|e| NeuroError::SerializationError(format!("Config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, NeuroError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            NeuroError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(NeuroError::SerializationError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            NeuroError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

/// Command-line values that override the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub dataset: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Effective settings of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: PathBuf,
    pub dataset: String,
    pub host: String,
    pub port: u16,
    pub thresholds: HpThresholds,
}

impl Settings {
    #[must_use]
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        let defaults = HpThresholds::default();
        Self {
            database: overrides
                .database
                .or(file.database)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            dataset: overrides
                .dataset
                .or(file.dataset)
                .unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            host: overrides
                .host
                .or(file.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            thresholds: HpThresholds::new(
                file.thresholds.pre.unwrap_or(defaults.pre),
                file.thresholds.post.unwrap_or(defaults.post),
            ),
        }
    }

    /// Read the file at `path` (if any) and apply `overrides`.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self, NeuroError> {
        let file = match path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, overrides))
    }
}

// =============================================================================
// TESTS
// =============================================================================

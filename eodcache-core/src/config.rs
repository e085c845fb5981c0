//! Archive configuration, loaded from TOML.
//!
//! ```toml
//! archive_dir = "csv/"
//! index_file = "archive.data"
//! default_source = "yahoo"
//!
//! [yahoo]
//! timeout_secs = 30
//! max_retries = 3
//! base_delay_ms = 500
//! ```
//!
//! Every key is optional.

use crate::archive::INDEX_FILE_NAME;
use crate::data::yahoo::YAHOO_SOURCE;
use crate::error::ArchiveError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Root directory of the archive. Always ends with a path separator.
    pub archive_dir: PathBuf,
    /// Index file name, relative to `archive_dir`.
    pub index_file: String,
    /// Provider used when a request names no source.
    pub default_source: String,
    pub yahoo: YahooSettings,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            archive_dir: normalize_archive_dir("csv"),
            index_file: INDEX_FILE_NAME.to_string(),
            default_source: YAHOO_SOURCE.to_string(),
            yahoo: YahooSettings::default(),
        }
    }
}

impl ArchiveConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ArchiveError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ArchiveError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ArchiveError> {
        let mut config: ArchiveConfig = toml::from_str(content)?;
        config.archive_dir = normalize_archive_dir(&config.archive_dir);
        if config.index_file.trim().is_empty() {
            return Err(ArchiveError::Config("index_file must not be empty".into()));
        }
        Ok(config)
    }

    /// Full path of the index file.
    pub fn index_path(&self) -> PathBuf {
        self.archive_dir.join(&self.index_file)
    }
}

/// Settings for the Yahoo Finance provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct YahooSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for YahooSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

/// Append a trailing separator unless the path already ends with one.
pub fn normalize_archive_dir(path: impl AsRef<Path>) -> PathBuf {
    let mut s = path.as_ref().as_os_str().to_os_string();
    let text = s.to_string_lossy();
    if !text.ends_with('/') && !text.ends_with(MAIN_SEPARATOR) {
        s.push(MAIN_SEPARATOR.to_string());
    }
    PathBuf::from(s)
}

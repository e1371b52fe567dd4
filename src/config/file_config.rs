//! Configuration file support for research-crawler.
//!
//! # Configuration File Format
//!
//! ```toml
//! [database]
//! url = "http://localhost:5984"
//! username = "admin"
//! password = "admin"
//! name = "research_items"
//!
//! [queue]
//! capacity = 500
//!
//! [crawl]
//! empty_page_policy = "stop"    # or "fetch-next"
//! max_pages = 50
//! timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! format = "text"               # or "json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Config;

/// Configuration as stored in a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFile {
    pub config: Config,
}

impl ConfigFile {
    /// Save configuration to a TOML file, creating parent directories.
    ///
    /// The result is readable by [`load_config`](super::load_config).
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }
}

impl From<Config> for ConfigFile {
    fn from(config: Config) -> Self {
        Self { config }
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

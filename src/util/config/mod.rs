//! weakling configuration
//!
//! Configuration for the demo binary and for embedders that want to pick a
//! heap's reference processing mode from a file.
//!
//! # Example file
//!
//! ```toml
//! [heap]
//! processing = "background"
//!
//! [log]
//! level = "debug"
//! ```
//!
//! # Usage
//!
//! ```rust
//! use weakling::util::config::{load_config, WeaklingConfig};
//!
//! let config = load_config("weakling.toml").unwrap_or_default();
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::runtime::heap::{HeapConfig, Processing};
use crate::util::logger::LogLevel;

/// Default configuration file name
pub const CONFIG_FILE: &str = "weakling.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WeaklingConfig {
    /// Heap settings
    #[serde(default)]
    pub heap: HeapSection,
    /// Log settings
    #[serde(default)]
    pub log: LogSection,
}

/// Heap configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HeapSection {
    /// Reference processing mode
    #[serde(default)]
    pub processing: Processing,
}

impl From<&HeapSection> for HeapConfig {
    fn from(section: &HeapSection) -> Self {
        HeapConfig::with_processing(section.processing)
    }
}

/// Log configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LogSection {
    /// Minimum level
    #[serde(default)]
    pub level: LogLevel,
}

impl WeaklingConfig {
    /// Heap configuration
    pub fn heap_config(&self) -> HeapConfig {
        HeapConfig::from(&self.heap)
    }
}

/// Parse configuration from TOML text
pub fn parse_config(content: &str) -> Result<WeaklingConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::ParseError)
}

/// Load configuration from `path`
/// Returns default config if the file doesn't exist
pub fn load_config(path: impl AsRef<Path>) -> Result<WeaklingConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(WeaklingConfig::default());
    }

    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    parse_config(&content)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// The file is not valid TOML or holds an invalid value
    #[error("Config parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

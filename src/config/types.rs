//! Configuration sections

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{spout::ffi_types::LIBRARY_BASE_NAME, telemetry::DEFAULT_DIAGNOSTIC_INTERVAL};

/// Where to find SpoutLibrary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library base name, without platform prefix or extension
    pub name: String,
    /// Exact file to load, tried before the search directories
    pub path: Option<PathBuf>,
    /// Directories searched for the platform file name
    pub search_dirs: Vec<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: LIBRARY_BASE_NAME.to_string(),
            path: None,
            search_dirs: vec![],
        }
    }
}

/// The sender announced to receivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderSection {
    /// Sender name
    pub name: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Default for SenderSection {
    fn default() -> Self {
        Self {
            name: "spout-bridge".to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when neither RUST_LOG nor -v is given
    pub level: String,
    /// Log file directory (None = data dir)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Per-frame diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// Log one send failure out of every this many
    pub diagnostic_interval: u64,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            diagnostic_interval: DEFAULT_DIAGNOSTIC_INTERVAL,
        }
    }
}

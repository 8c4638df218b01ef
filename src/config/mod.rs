//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::spout::SenderConfig;

pub mod types;

pub use types::{FramesConfig, LibraryConfig, LoggingConfig, SenderSection};

const APP_DIR: &str = "spout-bridge";

/// Default config file location: `<config dir>/spout-bridge/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Resolve log directory.
///
/// The configured path wins, falling back to XDG_DATA_HOME/spout-bridge/logs.
pub fn resolve_log_dir(configured: &Option<PathBuf>) -> PathBuf {
    configured.clone().unwrap_or_else(|| {
        dirs::data_dir().map_or_else(
            || std::env::temp_dir().join(APP_DIR),
            |d| d.join(APP_DIR).join("logs"),
        )
    })
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Library location
    #[serde(default)]
    pub library: LibraryConfig,
    /// Sender name and frame size
    #[serde(default)]
    pub sender: SenderSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-frame diagnostics
    #[serde(default)]
    pub frames: FramesConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(default) if default.exists() => Self::load(default),
                _ => Ok(Self::default_config()),
            },
        }
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            library: LibraryConfig::default(),
            sender: SenderSection::default(),
            logging: LoggingConfig::default(),
            frames: FramesConfig::default(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.library.name.trim().is_empty() {
            anyhow::bail!("Library name must not be empty");
        }

        self.sender_config()?;

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        if self.frames.diagnostic_interval == 0 {
            anyhow::bail!("diagnostic_interval must be at least 1");
        }

        Ok(())
    }

    /// Sender settings as a validated [`SenderConfig`]
    pub fn sender_config(&self) -> Result<SenderConfig> {
        SenderConfig::new(
            self.sender.name.clone(),
            self.sender.width,
            self.sender.height,
        )
        .context("Invalid [sender] section")
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        name: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Self {
        if let Some(name) = name {
            self.sender.name = name;
        }
        if let Some(width) = width {
            self.sender.width = width;
        }
        if let Some(height) = height {
            self.sender.height = height;
        }

        self
    }

    /// Force an explicit library file
    pub fn with_library_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.library.path = path;
        }
        self
    }
}

//! Configuration file loader.

use std::path::PathBuf;

use super::DccConfig;

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .dcc-check.toml
        search_paths.push(PathBuf::from(".dcc-check.toml"));

        // 2. User config directory: ~/.config/dcc-check/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("dcc-check").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load and validate configuration from the first available file, or
    /// return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed or
    /// validated. Validation errors name the offending file.
    pub fn load(&self) -> Result<DccConfig, ConfigError> {
        let Some(path) = self.search_paths.iter().find(|p| p.exists()) else {
            tracing::debug!("No config file found, using defaults");
            return Ok(DccConfig::default());
        };

        tracing::debug!(path = %path.display(), "Loading config file");
        let config = Self::load_from_path(path)?;
        config.validate().map_err(|e| match e {
            ConfigError::Invalid(reason) => ConfigError::InvalidFile {
                path: path.clone(),
                reason,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &PathBuf) -> Result<DccConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid config file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },
}

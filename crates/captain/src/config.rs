//! Configuration file loading.
//!
//! This module provides types and functions for loading the tournament
//! manager's configuration from a TOML file (`captain.toml` by default).
//! Every field has a default, so a missing file yields a usable config.

use captain_core::{DuplicateIdentities, DEFAULT_ROUND_COUNT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// The file parsed but holds an unusable value.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How to invoke the external pairing engine.
///
/// The engine is started as `program [args...] <slot-path>`, without a shell.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path to the engine executable. Resolved through `PATH` when relative
    /// and without separators. Defaults to the bundled stand-in engine.
    #[serde(default = "default_engine_program")]
    pub program: PathBuf,
    /// Extra arguments placed before the slot path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds to wait for the engine before killing it. Defaults to 60.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_engine_program() -> PathBuf {
    PathBuf::from("captain-stub-engine")
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// The engine timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Main configuration structure.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptainConfig {
    /// Directory holding one JSON record per tournament.
    /// Defaults to `tournaments`.
    #[serde(default = "default_tournaments_dir")]
    pub tournaments_dir: PathBuf,
    /// Planned round count for newly created tournaments. Defaults to 5.
    #[serde(default = "default_round_count")]
    pub default_round_count: u32,
    /// Policy for registering a player under an identity already in use.
    #[serde(default)]
    pub duplicate_identities: DuplicateIdentities,
    /// Pairing engine invocation.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_tournaments_dir() -> PathBuf {
    PathBuf::from("tournaments")
}

fn default_round_count() -> u32 {
    DEFAULT_ROUND_COUNT
}

impl Default for CaptainConfig {
    fn default() -> Self {
        Self {
            tournaments_dir: default_tournaments_dir(),
            default_round_count: default_round_count(),
            duplicate_identities: DuplicateIdentities::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl CaptainConfig {
    /// Loads the configuration from [`Self::config_path()`].
    ///
    /// Returns the default configuration if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// [`ConfigError::ParseError`] if it contains invalid TOML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Loads the configuration from an explicit path, falling back to the
    /// defaults when the file does not exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the path to the configuration file.
    ///
    /// Currently returns `captain.toml` in the current working directory.
    pub fn config_path() -> PathBuf {
        PathBuf::from("captain.toml")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_round_count == 0 {
            return Err(ConfigError::Invalid(
                "default_round_count must be at least 1".to_string(),
            ));
        }
        if self.engine.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "engine.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.engine.program.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "engine.program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

//! Configuration loading and database path resolution
//!
//! Bootstrap configuration comes from a small TOML file. Resolution order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `FORMBIND_CONFIG`
//! 3. Platform config directory (`<config_dir>/formbind/formbind.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is not an error: defaults are used and a warning
//! is logged.

use crate::entity::{EntityKind, TECH_ID_FIELD};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FORMBIND_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Entity synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings handed to the entity synchronizer at construction
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    /// Actor recorded on writes when the caller supplies none
    #[serde(default = "default_fallback_actor")]
    pub fallback_actor: String,

    /// Technology fields that must be non-empty to create a technology
    #[serde(default = "default_required_technology_fields")]
    pub required_technology_fields: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fallback_actor: default_fallback_actor(),
            required_technology_fields: default_required_technology_fields(),
        }
    }
}

impl SyncConfig {
    /// Validate that the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.fallback_actor.trim().is_empty() {
            return Err(Error::Config("sync.fallback_actor must not be blank".to_string()));
        }

        for field in &self.required_technology_fields {
            if EntityKind::Technology.field(field).is_none() {
                return Err(Error::Config(format!(
                    "sync.required_technology_fields: unknown technology field '{}'",
                    field
                )));
            }
        }

        Ok(())
    }

    /// Pick the caller's actor id, falling back when absent or blank
    pub fn resolve_actor(&self, actor_id: Option<&str>) -> String {
        actor_id
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.fallback_actor)
            .to_string()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_fallback_actor() -> String {
    "system".to_string()
}

fn default_required_technology_fields() -> Vec<String> {
    [TECH_ID_FIELD, "technologyName", "inventorName", "reviewerName"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration, falling back to defaults
    ///
    /// An explicitly requested file (CLI or environment) that fails to load
    /// is an error; a missing platform default file is not.
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Self::load(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Self::load(Path::new(&path));
            }
        }

        // Priority 3: Platform config directory
        if let Some(path) = default_config_file() {
            if path.exists() {
                info!("Loading configuration from {}", path.display());
                return Self::load(&path);
            }
        }

        // Priority 4: Compiled defaults
        warn!("No configuration file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Database path: CLI argument, then TOML, then platform default
    pub fn database_path(&self, cli_arg: Option<&Path>) -> PathBuf {
        cli_arg
            .map(Path::to_path_buf)
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(default_database_path)
    }
}

/// Default configuration file path for the platform
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("formbind").join("formbind.toml"))
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("formbind"))
        .unwrap_or_else(|| PathBuf::from("./formbind_data"))
        .join("formbind.db")
}

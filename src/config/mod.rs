//! Configuration management for sal-inventory
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Inventory submission configuration
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// CSV export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Report pagination
    #[serde(default)]
    pub reports: ReportsConfig,

    /// Report access tokens
    #[serde(default)]
    pub access: AccessConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Which distinct-machine query the backend should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistinctMode {
    /// Use the backend's native support when it has it
    Auto,
    Native,
    Fallback,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Distinct-machine strategy selection
    #[serde(default = "default_distinct_strategy")]
    pub distinct_strategy: DistinctMode,
}

/// Inventory submission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Reject submissions and hash lookups without a valid machine key
    #[serde(default = "default_require_machine_key")]
    pub require_machine_key: bool,

    /// Fleet-wide keys accepted for any machine
    #[serde(default)]
    pub shared_keys: Vec<String>,

    /// Bundle ids that are never recorded
    #[serde(default = "default_bundleid_ignorelist")]
    pub bundleid_ignorelist: Vec<String>,

    /// Largest decompressed payload accepted, in bytes
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

/// CSV export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Base of every generated CSV filename
    #[serde(default = "default_filename_base")]
    pub filename_base: String,
}

/// Report pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,
}

/// Report access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub tokens: Vec<AccessToken>,
}

/// A bearer token granting read access to reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,

    /// Grants every scope, including "all"
    #[serde(default)]
    pub global: bool,

    /// Business unit ids this token may read
    #[serde(default)]
    pub business_units: Vec<i64>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for sal-inventory data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            distinct_strategy: default_distinct_strategy(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            require_machine_key: default_require_machine_key(),
            shared_keys: Vec::new(),
            bundleid_ignorelist: default_bundleid_ignorelist(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            filename_base: default_filename_base(),
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

impl Config {
    /// Get the default base directory (~/.sal-inventory)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sal-inventory")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("inventory.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Database sits next to the config file
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("inventory.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind_address.parse().map_err(|_| {
            Error::Config(format!(
                "server.bind_address is not a socket address: {}",
                self.server.bind_address
            ))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be positive".to_string(),
            ));
        }

        if self.reports.per_page == 0 || self.reports.per_page > self.reports.max_per_page {
            return Err(Error::Config(
                "reports.per_page must be between 1 and reports.max_per_page".to_string(),
            ));
        }

        if self.export.filename_base.trim().is_empty() {
            return Err(Error::Config(
                "export.filename_base must not be empty".to_string(),
            ));
        }

        if self.submission.bundleid_ignorelist.iter().any(|b| b.is_empty()) {
            return Err(Error::Config(
                "submission.bundleid_ignorelist entries must not be empty".to_string(),
            ));
        }

        if self.submission.shared_keys.iter().any(|k| k.is_empty()) {
            return Err(Error::Config(
                "submission.shared_keys entries must not be empty".to_string(),
            ));
        }

        if self.submission.max_payload_bytes == 0 {
            return Err(Error::Config(
                "submission.max_payload_bytes must be positive".to_string(),
            ));
        }

        if self.access.tokens.iter().any(|t| t.token.is_empty()) {
            return Err(Error::Config("access.tokens[].token must not be empty".to_string()));
        }

        Ok(())
    }
}

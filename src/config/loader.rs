//! Configuration loader
//!
//! Priority order (highest to lowest):
//! 1. Explicit path (`--config`)
//! 2. Project config (./.mcp-scaffold.toml)
//! 3. $MCP_SCAFFOLD_CONFIG
//! 4. User-global config (~/.config/mcp-scaffold/config.toml)
//! 5. Built-in defaults

use crate::config::defaults::{self, APP_DIR_NAME};
use crate::config::UserConfig;
use crate::log_system::{DestinationConfig, LogLevel};
use crate::types::ConfigError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Resolved, immutable server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub name: String,
    pub description: String,
    pub log_level: String,
    pub log_retention_days: u32,
    pub summary_limit: usize,
    pub data_dir: PathBuf,
    pub database_name: String,
    pub destinations: Vec<DestinationConfig>,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: defaults::DEFAULT_NAME.to_string(),
            description: defaults::DEFAULT_DESCRIPTION.to_string(),
            log_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
            log_retention_days: defaults::DEFAULT_RETENTION_DAYS,
            summary_limit: defaults::DEFAULT_SUMMARY_LIMIT,
            data_dir: defaults::default_data_dir(),
            database_name: defaults::DEFAULT_DATABASE_NAME.to_string(),
            destinations: defaults::default_destinations(),
            source: None,
        }
    }
}

impl ServerConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_name)
    }

    /// Configured threshold; unknown names fall back to INFO.
    pub fn level(&self) -> LogLevel {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level '{}', using INFO", self.log_level);
            LogLevel::Info
        })
    }

    /// Overlay a parsed user config onto the defaults.
    pub fn from_user_config(user: UserConfig) -> Self {
        let mut config = Self::default();

        if let Some(server) = user.server {
            if let Some(name) = server.name {
                config.name = name;
            }
            if let Some(description) = server.description {
                config.description = description;
            }
            if let Some(level) = server.log_level {
                config.log_level = level;
            }
            if let Some(data_dir) = server.data_dir {
                config.data_dir = data_dir;
            }
        }

        if let Some(logging) = user.logging {
            if let Some(level) = logging.level {
                config.log_level = level;
            }
            if let Some(days) = logging.retention_days {
                config.log_retention_days = days;
            }
            if let Some(name) = logging.database_name {
                config.database_name = name;
            }
            if let Some(limit) = logging.summary_limit {
                config.summary_limit = limit;
            }
            if !logging.destinations.is_empty() {
                config.destinations = logging.destinations;
            }
        }

        config
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the first config file found, or defaults if there is none.
    pub fn load(explicit: Option<&Path>) -> Result<ServerConfig, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        for path in Self::candidates() {
            if path.exists() {
                return Self::load_file(&path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(ServerConfig::default())
    }

    pub fn load_file(path: &Path) -> Result<ServerConfig, ConfigError> {
        debug!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;

        let mut config = Self::parse(&content)
            .map_err(|e| ConfigError::Parse(path.display().to_string(), e))?;
        config.source = Some(path.to_path_buf());

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<ServerConfig, toml::de::Error> {
        let user: UserConfig = toml::from_str(content)?;
        Ok(ServerConfig::from_user_config(user))
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(".mcp-scaffold.toml"));
        }

        if let Ok(config_path) = std::env::var("MCP_SCAFFOLD_CONFIG") {
            candidates.push(PathBuf::from(config_path));
        }

        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join(APP_DIR_NAME).join("config.toml"));
        }

        candidates
    }
}

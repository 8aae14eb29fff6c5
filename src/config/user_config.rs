//! User configuration file parsing
//!
//! Mirrors the on-disk TOML layout:
//!
//! ```toml
//! [server]
//! name = "My server"
//! log_level = "DEBUG"
//!
//! [logging]
//! retention_days = 14
//!
//! [[logging.destinations]]
//! type = "sqlite"
//! enabled = true
//! ```

use crate::log_system::DestinationConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub name: Option<String>,
    pub description: Option<String>,
    pub log_level: Option<String>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub retention_days: Option<u32>,
    pub database_name: Option<String>,
    pub summary_limit: Option<usize>,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

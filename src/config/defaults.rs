//! Built-in configuration defaults
//!
//! Used whenever a config file omits a setting, or no config file exists.

use crate::log_system::DestinationConfig;
use std::path::PathBuf;

pub const APP_DIR_NAME: &str = "mcp-scaffold";
pub const DEFAULT_NAME: &str = "MCP Scaffold server";
pub const DEFAULT_DESCRIPTION: &str =
    "MCP server with instrumented tools and unified logging";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_DATABASE_NAME: &str = "unified_logs.db";
pub const DEFAULT_SUMMARY_LIMIT: usize = 200;

/// Platform data directory, falling back to the system temp dir.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// A single enabled sqlite destination.
pub fn default_destinations() -> Vec<DestinationConfig> {
    vec![DestinationConfig::new("sqlite")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_destinations() {
        let destinations = default_destinations();
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].kind, "sqlite");
        assert!(destinations[0].enabled);
        assert!(destinations[0].settings.is_empty());
    }

    #[test]
    fn test_default_data_dir_is_app_scoped() {
        assert!(default_data_dir().ends_with(APP_DIR_NAME));
    }
}

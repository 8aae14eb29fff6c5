//! Process metadata for the dashboard

use crate::config::ServerConfig;
use crate::log_system::DestinationFactory;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeInfo {
    pub name: String,
    pub version: String,
    pub process_id: u32,
    pub started_at: String,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub config_source: Option<PathBuf>,
    pub log_level: String,
    pub destination_types: Vec<String>,
}

impl RuntimeInfo {
    pub fn collect(config: &ServerConfig, factory: &DestinationFactory) -> Self {
        Self {
            name: config.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            process_id: std::process::id(),
            started_at: chrono::Utc::now().to_rfc3339(),
            data_dir: config.data_dir.clone(),
            database_path: config.database_path(),
            config_source: config.source.clone(),
            log_level: config.log_level.clone(),
            destination_types: factory.available_types(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_reports_sqlite() {
        let config = ServerConfig::default();
        let info = RuntimeInfo::collect(&config, &DestinationFactory::with_builtin());
        assert_eq!(info.process_id, std::process::id());
        assert_eq!(info.destination_types, vec!["sqlite".to_string()]);
        assert!(info.database_path.ends_with("unified_logs.db"));
    }
}

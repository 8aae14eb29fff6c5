//! Pluggable log destinations
//!
//! A destination durably stores [`LogEntry`] values. New destination types
//! are added by registering a builder with [`DestinationFactory`]; the
//! logging pipeline itself never changes.

pub mod sqlite;

use crate::config::ServerConfig;
use crate::log_system::LogEntry;
use crate::types::LogError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

pub use sqlite::{LogQuery, SqliteDestination};

/// A sink for log entries. `write` may be called concurrently.
#[async_trait]
pub trait LogDestination: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, entry: &LogEntry) -> Result<(), LogError>;

    /// Flush and release resources.
    async fn close(&self) -> Result<(), LogError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl DestinationConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            enabled: true,
            settings: BTreeMap::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

type DestinationBuilder = Arc<
    dyn Fn(DestinationConfig, ServerConfig) -> BoxFuture<'static, Result<Arc<dyn LogDestination>, LogError>>
        + Send
        + Sync,
>;

/// Maps destination type tags to builders.
#[derive(Clone, Default)]
pub struct DestinationFactory {
    builders: BTreeMap<String, DestinationBuilder>,
}

impl DestinationFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with the `sqlite` destination registered.
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register(sqlite::DESTINATION_TYPE, |config, server| async move {
            let destination = SqliteDestination::from_config(&config, &server).await?;
            Ok(Arc::new(destination) as Arc<dyn LogDestination>)
        });
        factory
    }

    pub fn register<F, Fut>(&mut self, kind: impl Into<String>, builder: F)
    where
        F: Fn(DestinationConfig, ServerConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn LogDestination>, LogError>> + Send + 'static,
    {
        let builder: DestinationBuilder = Arc::new(
            move |config: DestinationConfig,
                  server: ServerConfig|
                  -> BoxFuture<'static, Result<Arc<dyn LogDestination>, LogError>> {
                Box::pin(builder(config, server))
            },
        );
        self.builders.insert(kind.into(), builder);
    }

    pub fn available_types(&self) -> Vec<String> {
        self.builders.keys().cloned().collect()
    }

    pub async fn create(
        &self,
        config: &DestinationConfig,
        server: &ServerConfig,
    ) -> Result<Arc<dyn LogDestination>, LogError> {
        let builder = self
            .builders
            .get(&config.kind)
            .ok_or_else(|| LogError::UnknownDestination(config.kind.clone()))?;

        debug!("Creating log destination: {}", config.kind);
        builder(config.clone(), server.clone()).await
    }

    /// Build every enabled destination. When nothing is enabled, falls
    /// back to a single sqlite destination.
    pub async fn create_enabled(
        &self,
        configs: &[DestinationConfig],
        server: &ServerConfig,
    ) -> Result<Vec<Arc<dyn LogDestination>>, LogError> {
        let mut enabled: Vec<DestinationConfig> =
            configs.iter().filter(|c| c.enabled).cloned().collect();

        if enabled.is_empty() {
            info!("No log destinations enabled, using default sqlite destination");
            enabled.push(DestinationConfig::new(sqlite::DESTINATION_TYPE));
        }

        let mut destinations = Vec::with_capacity(enabled.len());
        for config in &enabled {
            destinations.push(self.create(config, server).await?);
        }

        Ok(destinations)
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use mcp_scaffold::log_system::{LogDestination, LogEntry, LogLevel};
use mcp_scaffold::pipeline::{Arguments, InvocationConfig, Pipeline};
use mcp_scaffold::types::LogError;
use mcp_scaffold::UnifiedLogger;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Keeps every written entry in memory.
#[derive(Default)]
pub struct MemoryDestination {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryDestination {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogDestination for MemoryDestination {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, entry: &LogEntry) -> Result<(), LogError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        Ok(())
    }
}

pub fn memory_pipeline() -> (Arc<MemoryDestination>, UnifiedLogger, Pipeline) {
    let memory = Arc::new(MemoryDestination::default());
    let logger = UnifiedLogger::new(vec![memory.clone()], LogLevel::Debug);
    let pipeline = Pipeline::new(logger.clone(), InvocationConfig::default());
    (memory, logger, pipeline)
}

pub fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => Arguments::from(map),
        other => panic!("arguments must be an object, got {}", other),
    }
}

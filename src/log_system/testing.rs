//! In-memory destinations for unit tests

use crate::log_system::{LogDestination, LogEntry};
use crate::types::LogError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryDestination {
    entries: Mutex<Vec<LogEntry>>,
    closed: AtomicBool,
}

impl MemoryDestination {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogDestination for MemoryDestination {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, entry: &LogEntry) -> Result<(), LogError> {
        // yield so writes interleave with producers like real I/O would
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FailingDestination;

#[async_trait]
impl LogDestination for FailingDestination {
    fn name(&self) -> &str {
        "failing"
    }

    async fn write(&self, _entry: &LogEntry) -> Result<(), LogError> {
        Err(LogError::Destination("failing".into(), "disk full".into()))
    }

    async fn close(&self) -> Result<(), LogError> {
        Ok(())
    }
}

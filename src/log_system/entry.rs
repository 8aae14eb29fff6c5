//! Unified log entry structure shared by every destination

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Timestamp layout used for storage. Sorts lexicographically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" | "critical" => Ok(Self::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warning,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// Log category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    ToolExecution,
    Internal,
    Framework,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolExecution => "tool_execution",
            Self::Internal => "internal",
            Self::Framework => "framework",
        }
    }
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool_execution" => Ok(Self::ToolExecution),
            "internal" => Ok(Self::Internal),
            "framework" => Ok(Self::Framework),
            other => Err(format!("unknown log type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" | "ok" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Filled in by the logger when left empty.
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub log_type: LogType,
    pub message: String,
    pub logger: Option<String>,
    pub tool_name: Option<String>,
    pub duration_ms: Option<f64>,
    pub status: Option<Status>,
    pub input_summary: Option<String>,
    pub output_summary: Option<String>,
    pub error_message: Option<String>,
    /// Source file that emitted the entry.
    pub module: Option<String>,
    /// Pipeline stage, or the innermost span for intercepted events.
    pub function: Option<String>,
    pub line: Option<u32>,
    pub thread_name: Option<String>,
    pub process_id: Option<u32>,
    pub extra: Map<String, Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, log_type: LogType, message: impl Into<String>) -> Self {
        let thread = std::thread::current();
        Self {
            correlation_id: String::new(),
            timestamp: Utc::now(),
            level,
            log_type,
            message: message.into(),
            logger: None,
            tool_name: None,
            duration_ms: None,
            status: None,
            input_summary: None,
            output_summary: None,
            error_message: None,
            module: None,
            function: None,
            line: None,
            thread_name: Some(thread.name().unwrap_or("unnamed").to_string()),
            process_id: Some(std::process::id()),
            extra: Map::new(),
        }
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_input(mut self, summary: impl Into<String>) -> Self {
        self.input_summary = Some(summary.into());
        self
    }

    pub fn with_output(mut self, summary: impl Into<String>) -> Self {
        self.output_summary = Some(summary.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_location(
        mut self,
        module: impl Into<String>,
        function: Option<String>,
        line: Option<u32>,
    ) -> Self {
        self.module = Some(module.into());
        self.function = function;
        self.line = line;
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Truncate on a char boundary, appending `...` when cut.
pub fn truncate_summary(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_parsing() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_builder_sets_fields() {
        let entry = LogEntry::new(LogLevel::Info, LogType::ToolExecution, "done")
            .with_correlation("req_abc")
            .with_tool("echo")
            .with_status(Status::Success)
            .with_duration_ms(1.5)
            .with_function("log_invocations")
            .with_extra("item_index", 2);

        assert_eq!(entry.correlation_id, "req_abc");
        assert_eq!(entry.tool_name.as_deref(), Some("echo"));
        assert_eq!(entry.status, Some(Status::Success));
        assert_eq!(entry.extra["item_index"], 2);
        assert_eq!(entry.function.as_deref(), Some("log_invocations"));
        assert_eq!(entry.process_id, Some(std::process::id()));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let entry = LogEntry::new(LogLevel::Info, LogType::Internal, "x");
        let parsed = parse_timestamp(&entry.timestamp_string()).unwrap();
        assert_eq!(
            parsed.timestamp_micros(),
            entry.timestamp.timestamp_micros()
        );
    }

    #[test]
    fn test_truncate_summary() {
        assert_eq!(truncate_summary("short", 10), "short");
        assert_eq!(truncate_summary("abcdef", 3), "abc...");
        // multi-byte chars are never split
        assert_eq!(truncate_summary("ééééé", 2), "éé...");
    }
}

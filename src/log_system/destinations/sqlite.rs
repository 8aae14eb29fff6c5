//! SQLite log destination
//!
//! Stores each entry as one appended row in `unified_logs`, creating the
//! schema on first use. The read-side queries exist for the dashboard; the
//! logging pipeline only ever writes.

use crate::config::ServerConfig;
use crate::log_system::entry::{parse_timestamp, TIMESTAMP_FORMAT};
use crate::log_system::{DestinationConfig, LogDestination, LogEntry, LogLevel, LogType, Status};
use crate::types::LogError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, QueryBuilder, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DESTINATION_TYPE: &str = "sqlite";

const DEFAULT_QUERY_LIMIT: usize = 1000;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS unified_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        correlation_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        log_type TEXT CHECK(log_type IN ('tool_execution', 'internal', 'framework')),
        message TEXT NOT NULL,
        logger TEXT,
        tool_name TEXT,
        duration_ms REAL,
        status TEXT CHECK(status IN ('success', 'error', 'running') OR status IS NULL),
        input_summary TEXT,
        output_summary TEXT,
        error_message TEXT,
        module TEXT,
        function TEXT,
        line INTEGER,
        thread_name TEXT,
        process_id INTEGER,
        extra_data TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_correlation_id ON unified_logs(correlation_id)",
    "CREATE INDEX IF NOT EXISTS idx_timestamp ON unified_logs(timestamp DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_level ON unified_logs(level)",
    "CREATE INDEX IF NOT EXISTS idx_tool_name ON unified_logs(tool_name)",
    "CREATE INDEX IF NOT EXISTS idx_log_type ON unified_logs(log_type)",
];

const COLUMNS: &str = "correlation_id, timestamp, level, log_type, message, logger, tool_name, \
     duration_ms, status, input_summary, output_summary, error_message, module, function, \
     line, thread_name, process_id, extra_data";

/// Filters for reading stored entries, most recent first.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub correlation_id: Option<String>,
    pub tool_name: Option<String>,
    pub level: Option<LogLevel>,
    pub log_type: Option<LogType>,
    pub status: Option<Status>,
    /// Substring match over message, input, output and error text.
    pub search: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            correlation_id: None,
            tool_name: None,
            level: None,
            log_type: None,
            status: None,
            search: None,
            since: None,
            until: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl LogQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn log_type(mut self, log_type: LogType) -> Self {
        self.log_type = Some(log_type);
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }
}

pub struct SqliteDestination {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteDestination {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let destination = Self {
            pool,
            path: path.to_path_buf(),
        };
        destination.initialize_schema().await?;

        debug!("Opened log database at {}", path.display());
        Ok(destination)
    }

    /// Build from a destination entry. Honors the `path` and
    /// `database_name` settings and applies the retention policy.
    pub async fn from_config(
        config: &DestinationConfig,
        server: &ServerConfig,
    ) -> Result<Self, LogError> {
        let path = match config.setting_str("path") {
            Some(path) => PathBuf::from(path),
            None => {
                let name = config
                    .setting_str("database_name")
                    .unwrap_or(&server.database_name);
                server.data_dir.join(name)
            }
        };

        let destination = Self::open(&path).await?;

        if server.log_retention_days > 0 {
            let purged = destination
                .purge_older_than(server.log_retention_days)
                .await?;
            if purged > 0 {
                info!(
                    "Purged {} log rows older than {} days",
                    purged, server.log_retention_days
                );
            }
        }

        Ok(destination)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn initialize_schema(&self) -> Result<(), LogError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn query(&self, filter: &LogQuery) -> Result<Vec<LogEntry>, LogError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM unified_logs WHERE 1=1", COLUMNS));

        if let Some(id) = &filter.correlation_id {
            builder.push(" AND correlation_id = ").push_bind(id.clone());
        }
        if let Some(tool) = &filter.tool_name {
            builder.push(" AND tool_name = ").push_bind(tool.clone());
        }
        if let Some(level) = filter.level {
            builder.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(log_type) = filter.log_type {
            builder.push(" AND log_type = ").push_bind(log_type.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(text) = &filter.search {
            let pattern = format!("%{}%", escape_like(text));
            builder
                .push(" AND (message LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR input_summary LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR output_summary LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR error_message LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(since) = filter.since {
            builder
                .push(" AND timestamp >= ")
                .push_bind(since.format(TIMESTAMP_FORMAT).to_string());
        }
        if let Some(until) = filter.until {
            builder
                .push(" AND timestamp <= ")
                .push_bind(until.format(TIMESTAMP_FORMAT).to_string());
        }

        builder
            .push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(filter.limit as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Distinct operation names seen so far, sorted.
    pub async fn tool_names(&self) -> Result<Vec<String>, LogError> {
        let rows = sqlx::query(
            "SELECT DISTINCT tool_name FROM unified_logs WHERE tool_name IS NOT NULL ORDER BY tool_name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("tool_name").map_err(LogError::from))
            .collect()
    }

    pub async fn count(&self) -> Result<u64, LogError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM unified_logs")
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }

    /// Delete rows older than `days`. Returns the number removed.
    pub async fn purge_older_than(&self, days: u32) -> Result<u64, LogError> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let result = sqlx::query("DELETE FROM unified_logs WHERE timestamp < ?")
            .bind(cutoff.format(TIMESTAMP_FORMAT).to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Make `%`, `_` and `\` match literally in a LIKE pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl LogDestination for SqliteDestination {
    fn name(&self) -> &str {
        DESTINATION_TYPE
    }

    async fn write(&self, entry: &LogEntry) -> Result<(), LogError> {
        let extra = if entry.extra.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&entry.extra)?)
        };

        let sql = format!(
            "INSERT INTO unified_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            COLUMNS
        );

        sqlx::query(&sql)
            .bind(entry.correlation_id.as_str())
            .bind(entry.timestamp_string())
            .bind(entry.level.as_str())
            .bind(entry.log_type.as_str())
            .bind(entry.message.as_str())
            .bind(entry.logger.as_deref())
            .bind(entry.tool_name.as_deref())
            .bind(entry.duration_ms)
            .bind(entry.status.map(|s| s.as_str()))
            .bind(entry.input_summary.as_deref())
            .bind(entry.output_summary.as_deref())
            .bind(entry.error_message.as_deref())
            .bind(entry.module.as_deref())
            .bind(entry.function.as_deref())
            .bind(entry.line.map(i64::from))
            .bind(entry.thread_name.as_deref())
            .bind(entry.process_id.map(i64::from))
            .bind(extra)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn close(&self) -> Result<(), LogError> {
        self.pool.close().await;
        debug!("Closed log database at {}", self.path.display());
        Ok(())
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<LogEntry, LogError> {
    let level: String = row.try_get("level")?;
    let log_type: Option<String> = row.try_get("log_type")?;
    let status: Option<String> = row.try_get("status")?;
    let timestamp: String = row.try_get("timestamp")?;
    let extra: Option<String> = row.try_get("extra_data")?;
    let line: Option<i64> = row.try_get("line")?;
    let process_id: Option<i64> = row.try_get("process_id")?;

    let extra = match extra {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::Map::new(),
    };

    Ok(LogEntry {
        correlation_id: row.try_get("correlation_id")?,
        timestamp: parse_timestamp(&timestamp).unwrap_or_else(Utc::now),
        level: level.parse().unwrap_or(LogLevel::Info),
        log_type: log_type
            .and_then(|t| t.parse().ok())
            .unwrap_or(LogType::Internal),
        message: row.try_get("message")?,
        logger: row.try_get("logger")?,
        tool_name: row.try_get("tool_name")?,
        duration_ms: row.try_get("duration_ms")?,
        status: status.and_then(|s| s.parse().ok()),
        input_summary: row.try_get("input_summary")?,
        output_summary: row.try_get("output_summary")?,
        error_message: row.try_get("error_message")?,
        module: row.try_get("module")?,
        function: row.try_get("function")?,
        line: line.map(|l| l as u32),
        thread_name: row.try_get("thread_name")?,
        process_id: process_id.map(|p| p as u32),
        extra,
    })
}

//! Correlation identifiers
//!
//! An identifier ties together every log line produced while servicing one
//! logical invocation. Identifiers are carried explicitly on the
//! [`CallContext`](crate::pipeline::CallContext) handed to each stage and
//! task; there is no ambient per-thread slot to leak between tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

const REQUEST_PREFIX: &str = "req_";
const STARTUP_PREFIX: &str = "startup_";

/// Fallback tag for entries logged outside any invocation or startup phase.
pub const INIT_CORRELATION: &str = "init";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Fresh per-invocation identifier (`req_` + 12 hex chars).
    pub fn new() -> Self {
        Self(format!("{}{}", REQUEST_PREFIX, short_hex()))
    }

    /// Identifier for process-initialization log lines.
    pub fn startup() -> Self {
        Self(format!("{}{}", STARTUP_PREFIX, short_hex()))
    }

    /// Adopt an identifier supplied by the client.
    pub fn from_client(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_startup(&self) -> bool {
        self.0.starts_with(STARTUP_PREFIX)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn short_hex() -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(12);
    hex
}

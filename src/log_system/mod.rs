//! Correlation-aware unified logging
//!
//! Every invocation is recorded asynchronously to a pluggable set of
//! destinations. Entries carry a correlation id that ties together all work
//! performed for one logical request.

mod correlation;
pub mod destinations;
pub mod entry;
pub mod intercept;
mod unified_logger;

#[cfg(test)]
pub(crate) mod testing;

pub use correlation::{CorrelationId, INIT_CORRELATION};
pub use destinations::{
    DestinationConfig, DestinationFactory, LogDestination, LogQuery, SqliteDestination,
};
pub use entry::{truncate_summary, LogEntry, LogLevel, LogType, Status};
pub use intercept::UnifiedLayer;
pub use unified_logger::{Logger, LoggerStats, StartupScope, UnifiedLogger};

//! MCP Scaffold - instrumented tool pipeline with unified logging
//!
//! Tools are wrapped with argument coercion, invocation logging, exception
//! capture and optional concurrent fan-out, and every invocation is recorded
//! asynchronously to pluggable log destinations under a correlation id.

pub mod config;
pub mod log_system;
pub mod mcp;
pub mod pipeline;
pub mod tools;
pub mod types;

pub use config::{ConfigLoader, RuntimeInfo, ServerConfig};
pub use log_system::{UnifiedLayer, UnifiedLogger};
pub use mcp::McpServer;
pub use pipeline::{Pipeline, Tool};
pub use tools::ToolRegistry;
pub use types::{LogError, ToolError};

//! MCP protocol host for the registered tools

pub mod protocol;
pub mod server;

pub use server::McpServer;

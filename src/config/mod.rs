//! Configuration system for the MCP scaffold
//!
//! Provides a layered configuration:
//! 1. Explicit or discovered TOML file (highest priority)
//! 2. Built-in defaults (lowest priority)

pub mod defaults;
mod loader;
mod runtime;
mod user_config;

pub use defaults::{default_data_dir, default_destinations};
pub use loader::{ConfigLoader, ServerConfig};
pub use runtime::RuntimeInfo;
pub use user_config::{LoggingSection, ServerSection, UserConfig};

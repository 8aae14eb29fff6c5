//! Tool registry and bundled example tools

pub mod examples;

use crate::pipeline::{Arguments, CallContext, Tool};
use crate::types::ToolError;
use serde_json::Value;
use tracing::{debug, warn};

pub use examples::register_example_tools;

/// Registered tools in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Tool) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!("Replacing already registered tool: {}", tool.name());
            *existing = tool;
            return;
        }

        debug!("Registered tool: {}", tool.descriptor().signature());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn call(&self, name: &str, ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call(ctx, args).await
    }
}

//! Instrumentation pipeline
//!
//! Each stage wraps a [`Tool`] and returns a new one carrying the same
//! [`OperationDescriptor`] (fan-out substitutes its batch descriptor).
//! [`Pipeline`] applies the standard chain:
//!
//! ```text
//! capture_errors -> log_invocations -> [fan_out ->] coerce -> tool body
//! ```

mod coercion;
mod context;
mod descriptor;
mod exception;
mod fan_out;
mod invocation_logger;
mod tool;

pub use coercion::{coerce, coerce_arguments, coerce_value};
pub use context::{CallContext, CorrelationScope, ProgressUpdate, RequestContext, CLIENT_CORRELATION_KEY};
pub use descriptor::{DescriptorBuilder, OperationDescriptor, ParamSpec, ParamType, CONTEXT_PARAM};
pub use exception::{capture_errors, escape_braces};
pub use fan_out::{fan_out, BATCH_PARAM};
pub use invocation_logger::{log_invocations, InvocationConfig};
pub use tool::{Arguments, Tool, ToolHandler};

use crate::log_system::UnifiedLogger;
use crate::types::DescriptorError;

const CAPTURE_LOGGER: &str = "mcp_scaffold.exceptions";
const INVOCATION_LOGGER: &str = "mcp_scaffold.tools";
const FAN_OUT_LOGGER: &str = "mcp_scaffold.parallel";

/// Applies the standard stage chain to tools before registration.
#[derive(Clone)]
pub struct Pipeline {
    logger: UnifiedLogger,
    config: InvocationConfig,
}

impl Pipeline {
    pub fn new(logger: UnifiedLogger, config: InvocationConfig) -> Self {
        Self { logger, config }
    }

    pub fn wrap(&self, tool: Tool) -> Tool {
        self.instrument(coerce(tool))
    }

    /// Like [`wrap`](Self::wrap), with each item of the batch coerced and
    /// executed concurrently.
    pub fn wrap_parallel(&self, tool: Tool) -> Result<Tool, DescriptorError> {
        let batch = fan_out(coerce(tool), self.logger.get_logger(FAN_OUT_LOGGER))?;
        Ok(self.instrument(batch))
    }

    fn instrument(&self, tool: Tool) -> Tool {
        let logged = log_invocations(tool, self.logger.get_logger(INVOCATION_LOGGER), self.config);
        capture_errors(logged, self.logger.get_logger(CAPTURE_LOGGER))
    }
}

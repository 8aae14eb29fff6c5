//! Exception capture
//!
//! Outermost stage. Every error leaving a tool is recorded once here, at
//! ERROR level with its type and a diagnostic trace, then returned to the
//! caller unchanged.

use crate::log_system::{LogLevel, LogType, Logger, Status};
use crate::pipeline::{Arguments, CallContext, Tool, ToolHandler};
use crate::types::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as _;
use std::sync::Arc;
use tracing::Instrument;

pub fn capture_errors(tool: Tool, logger: Logger) -> Tool {
    let descriptor = Arc::clone(tool.descriptor());
    let handler = CaptureErrors {
        name: descriptor.name().to_string(),
        inner: Arc::clone(tool.handler()),
        logger: logger.with_log_type(LogType::ToolExecution),
    };
    Tool::from_handler(descriptor, Arc::new(handler))
}

struct CaptureErrors {
    name: String,
    inner: Arc<dyn ToolHandler>,
    logger: Logger,
}

#[async_trait]
impl ToolHandler for CaptureErrors {
    async fn call(&self, mut ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        let id = ctx.ensure_current();
        let span = tracing::info_span!("tool_call", correlation_id = %id, tool_name = %self.name);

        let result = self.inner.call(ctx.clone(), args).instrument(span).await;
        if let Err(error) = &result {
            let trace = escape_braces(&diagnostic_trace(error));
            let logger = self.logger.bind(&ctx);
            let entry = logger
                .entry(
                    LogLevel::Error,
                    format!(
                        "Tool '{}' failed with {}: {}\n{}",
                        self.name,
                        error.kind(),
                        escape_braces(&error.message()),
                        trace
                    ),
                )
                .with_tool(&self.name)
                .with_function("capture_errors")
                .with_status(Status::Error)
                .with_error(error.to_string())
                .with_extra("exception_type", error.kind())
                .with_extra("traceback", trace);
            logger.emit(entry);
        }
        result
    }
}

/// Error display, its source chain, and a backtrace when one was captured.
fn diagnostic_trace(error: &ToolError) -> String {
    let mut trace = format!("{:?}", error);
    let mut source = error.source();
    while let Some(cause) = source {
        trace.push_str(&format!("\nCaused by: {}", cause));
        source = cause.source();
    }

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        trace.push_str(&format!("\n{}", backtrace));
    }
    trace
}

/// Double template braces so sinks that format messages print them literally.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

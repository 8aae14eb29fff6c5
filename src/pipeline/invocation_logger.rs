//! Invocation logging
//!
//! Records a start entry and a finish entry around every call, tagged with
//! the invocation's correlation id. The duration covers only the wrapped
//! call, measured on the monotonic clock.

use crate::config::defaults::DEFAULT_SUMMARY_LIMIT;
use crate::log_system::{truncate_summary, LogLevel, LogType, Logger, Status};
use crate::pipeline::{Arguments, CallContext, Tool, ToolHandler};
use crate::types::ToolError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationConfig {
    /// Maximum characters kept from input and output summaries.
    pub summary_limit: usize,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

impl InvocationConfig {
    /// Read known keys from a loose settings map, ignoring the rest.
    pub fn from_map(settings: &Map<String, Value>) -> Self {
        let mut config = Self::default();
        if let Some(limit) = settings.get("summary_limit").and_then(Value::as_u64) {
            config.summary_limit = limit as usize;
        }
        config
    }
}

pub fn log_invocations(tool: Tool, logger: Logger, config: InvocationConfig) -> Tool {
    let descriptor = Arc::clone(tool.descriptor());
    let handler = LogInvocations {
        name: descriptor.name().to_string(),
        inner: Arc::clone(tool.handler()),
        logger: logger.with_log_type(LogType::ToolExecution),
        config,
    };
    Tool::from_handler(descriptor, Arc::new(handler))
}

struct LogInvocations {
    name: String,
    inner: Arc<dyn ToolHandler>,
    logger: Logger,
    config: InvocationConfig,
}

impl LogInvocations {
    fn summarize(&self, value: &impl serde::Serialize) -> String {
        let text = serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {}>", e));
        truncate_summary(&text, self.config.summary_limit)
    }
}

#[async_trait]
impl ToolHandler for LogInvocations {
    async fn call(&self, mut ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        ctx.ensure_current();
        let logger = self.logger.bind(&ctx);

        let start = logger
            .entry(LogLevel::Info, format!("Tool '{}' started", self.name))
            .with_tool(&self.name)
            .with_function("log_invocations")
            .with_status(Status::Running)
            .with_input(self.summarize(&args));
        logger.emit(start);

        let started = Instant::now();
        let result = self.inner.call(ctx.clone(), args).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let finish = match &result {
            Ok(output) => logger
                .entry(
                    LogLevel::Info,
                    format!("Tool '{}' completed in {:.2}ms", self.name, duration_ms),
                )
                .with_status(Status::Success)
                .with_output(self.summarize(output)),
            Err(error) => logger
                .entry(
                    LogLevel::Warning,
                    format!("Tool '{}' failed after {:.2}ms", self.name, duration_ms),
                )
                .with_status(Status::Error)
                .with_error(error.to_string()),
        };
        logger.emit(
            finish
                .with_tool(&self.name)
                .with_function("log_invocations")
                .with_duration_ms(duration_ms),
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_system::testing::MemoryDestination;
    use crate::log_system::{CorrelationId, UnifiedLogger};
    use crate::pipeline::{OperationDescriptor, ParamSpec, ParamType, RequestContext};
    use serde_json::json;
    use std::time::Duration;

    async fn slow_echo(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let text = args.str("text")?;
        if text == "fail" {
            return Err(ToolError::operation("ValueError", "asked to fail"));
        }
        Ok(json!(text.repeat(100)))
    }

    fn echo_tool() -> Tool {
        let descriptor = OperationDescriptor::builder("slow_echo")
            .param(ParamSpec::required("text", ParamType::String))
            .build()
            .unwrap();
        Tool::new(descriptor, slow_echo)
    }

    fn text(value: &str) -> Arguments {
        let mut args = Arguments::new();
        args.insert("text", json!(value));
        args
    }

    #[tokio::test]
    async fn test_start_and_finish_entries() {
        let memory = Arc::new(MemoryDestination::default());
        let unified = UnifiedLogger::new(vec![memory.clone()], LogLevel::Debug);
        let tool = log_invocations(
            echo_tool(),
            unified.get_logger("invocations"),
            InvocationConfig { summary_limit: 40 },
        );

        let output = tool.call(CallContext::new(), text("ab")).await.unwrap();
        unified.close().await.unwrap();
        assert_eq!(output, json!("ab".repeat(100)));

        let entries = memory.entries();
        assert_eq!(entries.len(), 2);
        let (start, finish) = (&entries[0], &entries[1]);

        assert_eq!(start.status, Some(Status::Running));
        assert_eq!(start.input_summary.as_deref(), Some("{\"text\":\"ab\"}"));
        assert_eq!(finish.status, Some(Status::Success));
        assert_eq!(finish.level, LogLevel::Info);
        assert!(finish.duration_ms.unwrap() >= 20.0);
        assert!(finish.output_summary.as_ref().unwrap().chars().count() <= 43);
        assert_eq!(start.correlation_id, finish.correlation_id);
        assert_eq!(finish.tool_name.as_deref(), Some("slow_echo"));
    }

    #[tokio::test]
    async fn test_failure_recorded_as_warning() {
        let memory = Arc::new(MemoryDestination::default());
        let unified = UnifiedLogger::new(vec![memory.clone()], LogLevel::Debug);
        let tool = log_invocations(
            echo_tool(),
            unified.get_logger("invocations"),
            InvocationConfig::default(),
        );

        let error = tool.call(CallContext::new(), text("fail")).await.unwrap_err();
        unified.close().await.unwrap();

        assert_eq!(error, ToolError::operation("ValueError", "asked to fail"));
        let finish = &memory.entries()[1];
        assert_eq!(finish.level, LogLevel::Warning);
        assert_eq!(finish.status, Some(Status::Error));
        assert_eq!(finish.error_message.as_deref(), Some("ValueError: asked to fail"));
    }

    #[tokio::test]
    async fn test_adopts_client_correlation_id() {
        let memory = Arc::new(MemoryDestination::default());
        let unified = UnifiedLogger::new(vec![memory.clone()], LogLevel::Debug);
        let tool = log_invocations(
            echo_tool(),
            unified.get_logger("invocations"),
            InvocationConfig::default(),
        );

        let mut meta = Map::new();
        meta.insert("correlationId".into(), json!("req_from_client"));
        let ctx = CallContext::with_request(RequestContext::new(Some(json!(7)), meta));
        tool.call(ctx, text("x")).await.unwrap();

        let mut bound = CallContext::new();
        let id = bound.set_current(Some(CorrelationId::from_client("req_already_bound")));
        tool.call(bound, text("y")).await.unwrap();
        unified.close().await.unwrap();

        let ids: Vec<String> = memory.entries().into_iter().map(|e| e.correlation_id).collect();
        assert_eq!(
            ids,
            vec!["req_from_client", "req_from_client", id.as_str(), id.as_str()]
        );
    }

    #[test]
    fn test_config_from_map() {
        let mut settings = Map::new();
        settings.insert("summary_limit".into(), json!(12));
        settings.insert("unrelated".into(), json!(true));
        assert_eq!(InvocationConfig::from_map(&settings).summary_limit, 12);
        assert_eq!(
            InvocationConfig::from_map(&Map::new()),
            InvocationConfig::default()
        );
    }
}

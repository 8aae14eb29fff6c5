//! Concurrent fan-out of single-item tools
//!
//! Turns `f(a1..an) -> R` into `f(kwargs_list, ctx) -> [R]`. Every item in
//! `kwargs_list` runs as its own task under a fresh child correlation id.
//! Results keep input order. The first failing item aborts the remaining
//! tasks and its error is returned as-is.

use crate::log_system::{LogLevel, Logger};
use crate::pipeline::{
    Arguments, CallContext, OperationDescriptor, ParamSpec, ParamType, Tool, ToolHandler,
};
use crate::types::{DescriptorError, ToolError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Name of the single batch parameter.
pub const BATCH_PARAM: &str = "kwargs_list";

/// Wrap `tool` as a batch tool. The per-item tool should already coerce its
/// own arguments.
pub fn fan_out(tool: Tool, logger: Logger) -> Result<Tool, DescriptorError> {
    let item = tool.descriptor();
    let descriptor = OperationDescriptor::builder(item.name())
        .summary(batch_summary(item))
        .param(
            ParamSpec::required(BATCH_PARAM, ParamType::Array).describe(format!(
                "List of argument objects, one per call to {}",
                item.name()
            )),
        )
        .returns(ParamType::Array)
        .with_context()
        .build()?;

    let handler = FanOut {
        name: item.name().to_string(),
        inner: Arc::clone(tool.handler()),
        logger,
    };
    Ok(Tool::from_handler(Arc::new(descriptor), Arc::new(handler)))
}

fn batch_summary(item: &OperationDescriptor) -> String {
    let original = if item.summary().is_empty() {
        "No original description provided."
    } else {
        item.summary()
    };

    format!(
        "Parallelized version of `{name}`.\n\n\
         Accepts a list of argument objects and runs `{name}` concurrently for each one. \
         Results are returned in input order. If any item fails, the whole batch fails.\n\n\
         Original signature: {signature}\n\n\
         Original description:\n{original}",
        name = item.name(),
        signature = item.signature(),
        original = original,
    )
}

struct FanOut {
    name: String,
    inner: Arc<dyn ToolHandler>,
    logger: Logger,
}

#[async_trait]
impl ToolHandler for FanOut {
    async fn call(&self, ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        let items = batch_items(args)?;
        let logger = self.logger.bind(&ctx);

        if items.is_empty() {
            logger.warning(format!("Empty {} provided to {}", BATCH_PARAM, self.name));
            return Ok(Value::Array(Vec::new()));
        }

        let total = items.len();
        logger.info(format!(
            "Parallel execution of {} with {} items",
            self.name, total
        ));

        let mut tasks = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let child = ctx.child();
            let inner = Arc::clone(&self.inner);
            let item_logger = self.logger.bind(&child);
            let parent = ctx.current().map(|id| id.to_string());
            let name = self.name.clone();

            let span = tracing::info_span!(
                "fan_out_item",
                correlation_id = %child.current().map(|id| id.as_str()).unwrap_or_default(),
                tool_name = %name,
                item_index = index
            );

            tasks.spawn(
                async move {
                    let mut entry = item_logger
                        .entry(LogLevel::Debug, format!("{} item {} started", name, index))
                        .with_tool(&name)
                        .with_function("fan_out")
                        .with_extra("item_index", index);
                    if let Some(parent) = parent {
                        entry = entry.with_extra("parent_correlation_id", parent);
                    }
                    item_logger.emit(entry);

                    (index, inner.call(child, Arguments::from(item)).await)
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<Value>> = vec![None; total];
        let mut completed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tasks.abort_all();
                    return Err(ToolError::Internal(format!(
                        "Parallel task of {} did not complete: {}",
                        self.name, e
                    )));
                }
            };

            match result {
                Ok(value) => {
                    slots[index] = Some(value);
                    completed += 1;
                    ctx.report_progress(
                        completed as f64,
                        Some(total as f64),
                        Some(format!("Completed {}/{}", completed, total)),
                    );
                }
                Err(error) => {
                    tasks.abort_all();
                    let entry = logger
                        .entry(
                            LogLevel::Warning,
                            format!(
                                "Parallel execution of {} failed at item {}: {}",
                                self.name, index, error
                            ),
                        )
                        .with_tool(&self.name)
                        .with_function("fan_out")
                        .with_extra("failed_index", index);
                    logger.emit(entry);
                    return Err(error);
                }
            }
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    ToolError::Internal(format!("Parallel item {} produced no result", index))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Value::Array(results))
    }
}

/// Validate the batch argument: a list (or JSON text of one) of objects.
fn batch_items(args: Arguments) -> Result<Vec<Map<String, Value>>, ToolError> {
    let mut args = args.into_map();
    if let Some(extra) = args.keys().find(|name| name.as_str() != BATCH_PARAM) {
        return Err(ToolError::UnexpectedArgument(extra.clone()));
    }

    let raw = match args.remove(BATCH_PARAM) {
        None | Some(Value::Null) => {
            return Err(ToolError::MissingArgument {
                param: BATCH_PARAM.to_string(),
                expected: ParamType::Array,
            })
        }
        Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Some(value) => value,
    };

    let list = match raw {
        Value::Array(list) => list,
        other => {
            return Err(ToolError::NotAList {
                found: json_type(&other).to_string(),
            })
        }
    };

    list.into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(ToolError::ItemNotObject {
                index,
                found: json_type(&other).to_string(),
            }),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_system::testing::MemoryDestination;
    use crate::log_system::UnifiedLogger;
    use crate::pipeline::{coerce, RequestContext};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn repeat_text(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        let param = args.str("param")?;
        let multiplier = args.i64("multiplier")?;
        // later items finish first
        tokio::time::sleep(Duration::from_millis(10 * multiplier as u64)).await;
        if param == "boom" {
            return Err(ToolError::operation("ValueError", "cannot repeat boom"));
        }
        Ok(json!(param.repeat(multiplier.clamp(0, 16) as usize)))
    }

    fn repeat_tool() -> Tool {
        let descriptor = OperationDescriptor::builder("repeat_text")
            .summary("Repeat text a number of times")
            .param(ParamSpec::required("param", ParamType::String))
            .param(ParamSpec::optional("multiplier", ParamType::Integer, 1))
            .returns(ParamType::String)
            .build()
            .unwrap();
        coerce(Tool::new(descriptor, repeat_text))
    }

    fn batch(value: Value) -> Arguments {
        let mut args = Arguments::new();
        args.insert(BATCH_PARAM, value);
        args
    }

    fn harness() -> (Arc<MemoryDestination>, UnifiedLogger, Tool) {
        let memory = Arc::new(MemoryDestination::default());
        let unified = UnifiedLogger::new(vec![memory.clone()], LogLevel::Debug);
        let tool = fan_out(repeat_tool(), unified.get_logger("fan_out")).unwrap();
        (memory, unified, tool)
    }

    #[test]
    fn test_batch_signature() {
        let unified = UnifiedLogger::new(Vec::new(), LogLevel::Debug);
        let tool = fan_out(repeat_tool(), unified.get_logger("fan_out")).unwrap();
        let descriptor = tool.descriptor();

        assert_eq!(descriptor.name(), "repeat_text");
        assert_eq!(descriptor.params().len(), 1);
        assert_eq!(descriptor.params()[0].name, BATCH_PARAM);
        assert_eq!(descriptor.params()[0].ty, ParamType::Array);
        assert!(descriptor.accepts_context());
        assert_eq!(
            descriptor.signature(),
            "repeat_text(kwargs_list: list, ctx) -> list"
        );
        assert!(descriptor
            .summary()
            .contains("repeat_text(param: str, multiplier: int = 1) -> str"));
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let (_memory, unified, tool) = harness();
        let result = tool
            .call(
                CallContext::new(),
                batch(json!([
                    {"param": "a", "multiplier": 3},
                    {"param": "b", "multiplier": 2},
                    {"param": "c", "multiplier": 1}
                ])),
            )
            .await
            .unwrap();
        unified.close().await.unwrap();

        assert_eq!(result, json!(["aaa", "bb", "c"]));
    }

    #[tokio::test]
    async fn test_text_batch_and_text_items_are_accepted() {
        let (_memory, unified, tool) = harness();
        let result = tool
            .call(
                CallContext::new(),
                batch(json!("[{\"param\": \"x\", \"multiplier\": \"2\"}, {\"param\": \"y\"}]")),
            )
            .await
            .unwrap();
        unified.close().await.unwrap();

        assert_eq!(result, json!(["xx", "y"]));
    }

    #[tokio::test]
    async fn test_empty_batch_schedules_nothing() {
        let (memory, unified, tool) = harness();
        let result = tool.call(CallContext::new(), batch(json!([]))).await.unwrap();
        unified.close().await.unwrap();

        assert_eq!(result, json!([]));
        assert!(memory
            .entries()
            .iter()
            .all(|e| !e.message.contains("item")));
    }

    #[tokio::test]
    async fn test_first_failure_fails_batch() {
        let (memory, unified, tool) = harness();
        let started = std::time::Instant::now();
        let error = tool
            .call(
                CallContext::new(),
                batch(json!([
                    {"param": "a", "multiplier": 100},
                    {"param": "boom", "multiplier": 1},
                    {"param": "c", "multiplier": 100}
                ])),
            )
            .await
            .unwrap_err();
        let elapsed = started.elapsed();
        unified.close().await.unwrap();

        assert_eq!(error, ToolError::operation("ValueError", "cannot repeat boom"));
        assert!(elapsed < Duration::from_millis(900));
        let failure = memory
            .entries()
            .into_iter()
            .find(|e| e.extra.contains_key("failed_index"))
            .unwrap();
        assert_eq!(failure.extra["failed_index"], 1);
    }

    #[tokio::test]
    async fn test_item_validation_error_fails_batch() {
        let (_memory, unified, tool) = harness();
        let error = tool
            .call(
                CallContext::new(),
                batch(json!([{"param": "a"}, {"param": "b", "multiplier": "lots"}])),
            )
            .await
            .unwrap_err();
        unified.close().await.unwrap();

        assert!(matches!(error, ToolError::Validation { ref param, .. } if param == "multiplier"));
    }

    #[tokio::test]
    async fn test_rejects_malformed_batches() {
        let (_memory, unified, tool) = harness();

        let not_list = tool
            .call(CallContext::new(), batch(json!({"param": "a"})))
            .await
            .unwrap_err();
        assert_eq!(not_list, ToolError::NotAList { found: "dict".into() });

        let bad_item = tool
            .call(CallContext::new(), batch(json!([{"param": "a"}, "b"])))
            .await
            .unwrap_err();
        assert_eq!(
            bad_item,
            ToolError::ItemNotObject {
                index: 1,
                found: "str".into()
            }
        );
        assert_eq!(bad_item.kind(), "BatchInputError");

        let missing = tool.call(CallContext::new(), Arguments::new()).await.unwrap_err();
        assert!(matches!(missing, ToolError::MissingArgument { .. }));

        unified.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_items_run_under_child_ids() {
        let (memory, unified, tool) = harness();
        let mut ctx = CallContext::new();
        let parent = ctx.set_current(None);

        tool.call(
            ctx,
            batch(json!([{"param": "a"}, {"param": "b"}, {"param": "c"}])),
        )
        .await
        .unwrap();
        unified.close().await.unwrap();

        let item_entries: Vec<_> = memory
            .entries()
            .into_iter()
            .filter(|e| e.extra.contains_key("item_index"))
            .collect();
        assert_eq!(item_entries.len(), 3);

        let ids: HashSet<_> = item_entries.iter().map(|e| e.correlation_id.clone()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(parent.as_str()));
        assert!(item_entries
            .iter()
            .all(|e| e.extra["parent_correlation_id"] == parent.as_str()));
    }

    #[tokio::test]
    async fn test_progress_per_completed_item() {
        let (_memory, unified, tool) = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = CallContext::with_request(RequestContext::new(None, Map::new()).with_progress(tx));

        tool.call(ctx, batch(json!([{"param": "a"}, {"param": "b"}])))
            .await
            .unwrap();
        unified.close().await.unwrap();

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].progress, 2.0);
        assert_eq!(updates[1].total, Some(2.0));
    }
}

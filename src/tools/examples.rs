//! Example tools
//!
//! Small tools that exercise every stage of the pipeline. `process_batch_data`
//! and `simulate_heavy_computation` are registered as batch tools.

use crate::pipeline::{
    Arguments, CallContext, OperationDescriptor, ParamSpec, ParamType, Pipeline, Tool,
};
use crate::tools::ToolRegistry;
use crate::types::{DescriptorError, ToolError};
use chrono::{Local, Utc};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

const VALUE_ERROR: &str = "ValueError";

/// Largest string `repeat_text` will build, in bytes.
const MAX_REPEAT_BYTES: usize = 1 << 20;

/// Wrap every example tool with `pipeline` and add it to `registry`.
pub fn register_example_tools(
    registry: &mut ToolRegistry,
    pipeline: &Pipeline,
) -> Result<(), DescriptorError> {
    for tool in example_tools()? {
        registry.register(pipeline.wrap(tool));
    }
    for tool in parallel_example_tools()? {
        registry.register(pipeline.wrap_parallel(tool)?);
    }
    Ok(())
}

pub fn example_tools() -> Result<Vec<Tool>, DescriptorError> {
    Ok(vec![
        Tool::new(
            OperationDescriptor::builder("echo")
                .summary("Echo back the input message.")
                .param(ParamSpec::required("message", ParamType::String).describe("The message to echo back"))
                .returns(ParamType::String)
                .build()?,
            echo,
        ),
        Tool::new(
            OperationDescriptor::builder("get_time")
                .summary("Get the current time in a human-readable format.")
                .returns(ParamType::String)
                .build()?,
            get_time,
        ),
        Tool::new(
            OperationDescriptor::builder("random_number")
                .summary("Generate a random number within a specified range.")
                .param(ParamSpec::optional("min_value", ParamType::Integer, 1).describe("Minimum value"))
                .param(ParamSpec::optional("max_value", ParamType::Integer, 100).describe("Maximum value"))
                .build()?,
            random_number,
        ),
        Tool::new(
            OperationDescriptor::builder("calculate_fibonacci")
                .summary("Calculate the nth Fibonacci number.")
                .param(
                    ParamSpec::required("n", ParamType::Integer)
                        .describe("Position in the Fibonacci sequence (0 to 93)"),
                )
                .build()?,
            calculate_fibonacci,
        ),
        Tool::new(
            OperationDescriptor::builder("search")
                .summary("Search for content with optional filters.")
                .param(ParamSpec::required("query", ParamType::String).describe("Search query"))
                .param(
                    ParamSpec::optional("max_results", ParamType::Integer, 10)
                        .describe("Maximum number of results to return"),
                )
                .param(
                    ParamSpec::optional("directories", ParamType::Array, json!([]))
                        .describe("Directories to search in"),
                )
                .param(
                    ParamSpec::optional("include_hidden", ParamType::Boolean, false)
                        .describe("Whether to include hidden files"),
                )
                .build()?,
            search,
        ),
        Tool::new(
            OperationDescriptor::builder("repeat_text")
                .summary("Repeat a piece of text a number of times.")
                .param(ParamSpec::required("param", ParamType::String).describe("Text to repeat"))
                .param(ParamSpec::optional("multiplier", ParamType::Integer, 1).describe("Repetitions"))
                .returns(ParamType::String)
                .build()?,
            repeat_text,
        ),
    ])
}

pub fn parallel_example_tools() -> Result<Vec<Tool>, DescriptorError> {
    Ok(vec![
        Tool::new(
            OperationDescriptor::builder("process_batch_data")
                .summary("Process a batch of strings with 'upper', 'lower' or 'reverse'.")
                .param(ParamSpec::required("items", ParamType::Array).describe("Strings to process"))
                .param(
                    ParamSpec::optional("operation", ParamType::String, "upper")
                        .describe("Operation to perform"),
                )
                .build()?,
            process_batch_data,
        ),
        Tool::new(
            OperationDescriptor::builder("simulate_heavy_computation")
                .summary("Simulate a computation whose cost grows with complexity.")
                .param(
                    ParamSpec::optional("complexity", ParamType::Integer, 5)
                        .describe("Complexity level from 1 to 10"),
                )
                .build()?,
            simulate_heavy_computation,
        ),
    ])
}

fn value_error(message: impl Into<String>) -> ToolError {
    ToolError::operation(VALUE_ERROR, message)
}

async fn echo(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
    Ok(json!(format!("Echo: {}", args.str("message")?)))
}

async fn get_time(_ctx: CallContext, _args: Arguments) -> Result<Value, ToolError> {
    Ok(json!(format!(
        "Current time: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )))
}

async fn random_number(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
    let min = args.i64("min_value")?;
    let max = args.i64("max_value")?;
    if min > max {
        return Err(value_error("min_value must be less than or equal to max_value"));
    }

    Ok(json!({
        "number": fastrand::i64(min..=max),
        "range": format!("{}-{}", min, max),
        "timestamp": Utc::now().timestamp_millis() as f64 / 1000.0,
    }))
}

async fn calculate_fibonacci(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
    let n = args.i64("n")?;
    if n < 0 {
        return Err(value_error("n must be non-negative"));
    }

    let started = Instant::now();
    let value = if n == 0 {
        0
    } else {
        let (mut a, mut b) = (0u64, 1u64);
        for _ in 1..n {
            let next = a.checked_add(b).ok_or_else(|| {
                value_error(format!("Fibonacci number {} does not fit in 64 bits", n))
            })?;
            a = b;
            b = next;
        }
        b
    };

    Ok(json!({
        "position": n,
        "value": value,
        "calculation_time": started.elapsed().as_secs_f64(),
    }))
}

async fn search(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
    let query = args.str("query")?;
    let max_results = args.i64("max_results")?.max(0) as usize;
    let include_hidden = args.bool("include_hidden")?;

    let mut directories: Vec<String> = args
        .array("directories")?
        .iter()
        .map(|d| d.as_str().map(str::to_string).unwrap_or_else(|| d.to_string()))
        .collect();
    if directories.is_empty() {
        directories.push("default_dir".to_string());
    }

    // capped for the demo
    let results: Vec<Value> = (0..max_results.min(5))
        .map(|i| {
            json!({
                "id": i + 1,
                "title": format!("Result {} for '{}'", i + 1, query),
                "directory": directories[i % directories.len()],
                "hidden": include_hidden,
            })
        })
        .collect();

    Ok(json!({
        "query": query,
        "max_results": max_results,
        "directories": directories,
        "include_hidden": include_hidden,
        "result_count": results.len(),
        "message": format!(
            "Found {} results for '{}' in {} directories",
            results.len(),
            query,
            directories.len()
        ),
        "results": results,
    }))
}

async fn repeat_text(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
    let param = args.str("param")?;
    let multiplier = args.i64("multiplier")?;
    let times = usize::try_from(multiplier).map_err(|_| value_error("multiplier must be non-negative"))?;
    match param.len().checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_BYTES => Ok(json!(param.repeat(times))),
        _ => Err(value_error(format!(
            "Result would exceed {} bytes ({} x {})",
            MAX_REPEAT_BYTES,
            param.len(),
            multiplier
        ))),
    }
}

async fn process_batch_data(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
    tokio::time::sleep(Duration::from_millis(100)).await;

    let operation = args.str("operation")?;
    let items = args.array("items")?;

    let mut processed = Vec::with_capacity(items.len());
    for item in items {
        let text = item
            .as_str()
            .ok_or_else(|| value_error(format!("Items must be strings, got {}", item)))?;
        processed.push(match operation {
            "upper" => text.to_uppercase(),
            "lower" => text.to_lowercase(),
            "reverse" => text.chars().rev().collect(),
            other => return Err(value_error(format!("Unknown operation: {}", other))),
        });
    }

    Ok(json!({
        "original": items,
        "processed": processed,
        "operation": operation,
        "timestamp": Utc::now().timestamp_millis() as f64 / 1000.0,
    }))
}

async fn simulate_heavy_computation(_ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
    let complexity = args.i64("complexity")?;
    if !(1..=10).contains(&complexity) {
        return Err(value_error("complexity must be between 1 and 10"));
    }

    let started = Instant::now();
    let iterations = complexity as u64 * 100_000;
    let mut result = 0u64;
    for i in 0..iterations {
        result += i * 2;
        if i % 10_000 == 0 {
            tokio::task::yield_now().await;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    debug!("Heavy computation of complexity {} took {:.3}s", complexity, elapsed);

    Ok(json!({
        "complexity": complexity,
        "iterations": iterations,
        "result": result,
        "computation_time": elapsed,
        "operations_per_second": if elapsed > 0.0 { iterations as f64 / elapsed } else { 0.0 },
    }))
}

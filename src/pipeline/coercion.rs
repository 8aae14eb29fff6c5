//! Argument type coercion
//!
//! Some clients deliver every scalar argument as text. Before the tool body
//! runs, each declared parameter is converted to its declared type. Values
//! that already have the right type pass through untouched; text is parsed
//! conservatively and anything that does not parse completely is rejected.

use crate::pipeline::{Arguments, CallContext, OperationDescriptor, ParamSpec, ParamType, Tool, ToolHandler};
use crate::types::ToolError;
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::sync::Arc;

/// Wrap `tool` so its arguments are coerced before every call. The
/// descriptor is shared unchanged.
pub fn coerce(tool: Tool) -> Tool {
    let descriptor = Arc::clone(tool.descriptor());
    let handler = Coerce {
        descriptor: Arc::clone(&descriptor),
        inner: Arc::clone(tool.handler()),
    };
    Tool::from_handler(descriptor, Arc::new(handler))
}

struct Coerce {
    descriptor: Arc<OperationDescriptor>,
    inner: Arc<dyn ToolHandler>,
}

#[async_trait]
impl ToolHandler for Coerce {
    async fn call(&self, ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        let args = coerce_arguments(&self.descriptor, args)?;
        self.inner.call(ctx, args).await
    }
}

/// Produce the full, typed argument set for `descriptor`: every declared
/// parameter present, defaults applied, undeclared names rejected.
pub fn coerce_arguments(
    descriptor: &OperationDescriptor,
    args: Arguments,
) -> Result<Arguments, ToolError> {
    if let Some(unknown) = args.names().find(|name| descriptor.param(name).is_none()) {
        return Err(ToolError::UnexpectedArgument(unknown.to_string()));
    }

    let mut supplied = args.into_map();
    let mut coerced = Arguments::new();

    for param in descriptor.params() {
        let value = match supplied.remove(&param.name) {
            None | Some(Value::Null) => default_for(param)?,
            Some(value) => coerce_value(param, value)?,
        };
        coerced.insert(param.name.clone(), value);
    }

    Ok(coerced)
}

fn default_for(param: &ParamSpec) -> Result<Value, ToolError> {
    param
        .default
        .clone()
        .ok_or_else(|| ToolError::MissingArgument {
            param: param.name.clone(),
            expected: param.ty,
        })
}

/// Coerce one value to the parameter's declared type.
pub fn coerce_value(param: &ParamSpec, value: Value) -> Result<Value, ToolError> {
    if param.ty.matches(&value) {
        return Ok(value);
    }

    let parsed = match &value {
        Value::String(text) => parse_text(param.ty, text),
        _ => None,
    };

    parsed.ok_or_else(|| ToolError::Validation {
        param: param.name.clone(),
        expected: param.ty,
        value: match value {
            Value::String(text) => text,
            other => other.to_string(),
        },
    })
}

fn parse_text(ty: ParamType, text: &str) -> Option<Value> {
    let trimmed = text.trim();
    match ty {
        ParamType::Integer => trimmed.parse::<i64>().ok().map(Value::from),
        ParamType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        ParamType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Some(Value::Bool(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        ParamType::String => Some(Value::String(text.to_string())),
        ParamType::Array => serde_json::from_str::<Value>(trimmed)
            .ok()
            .filter(Value::is_array),
        ParamType::Object => serde_json::from_str::<Value>(trimmed)
            .ok()
            .filter(Value::is_object),
    }
}

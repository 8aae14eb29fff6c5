//! Operation descriptors
//!
//! A descriptor is the declared call shape of a tool: its ordered,
//! individually named and typed parameters plus defaults. It is built once
//! at registration, threaded unchanged through every wrapping stage, and read
//! by both argument coercion and tool discovery.

use crate::types::DescriptorError;
use serde_json::{json, Map, Value};
use std::fmt;

/// Name of the context parameter shown in signatures.
pub const CONTEXT_PARAM: &str = "ctx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Float,
    Boolean,
    String,
    Array,
    Object,
}

impl ParamType {
    /// JSON schema `type` keyword.
    pub fn schema_type(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Float => "number",
            ParamType::Boolean => "boolean",
            ParamType::String => "string",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Whether `value` already has this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::String => value.is_string(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Integer => "int",
            ParamType::Float => "float",
            ParamType::Boolean => "bool",
            ParamType::String => "str",
            ParamType::Array => "list",
            ParamType::Object => "dict",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, default: impl Into<Value>) -> Self {
        Self {
            default: Some(default.into()),
            ..Self::required(name, ty)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    name: String,
    summary: String,
    params: Vec<ParamSpec>,
    returns: ParamType,
    accepts_context: bool,
}

impl OperationDescriptor {
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            summary: String::new(),
            params: Vec::new(),
            returns: ParamType::Object,
            accepts_context: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn returns(&self) -> ParamType {
        self.returns
    }

    /// Whether the operation takes the protocol's execution context.
    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    /// Human-readable call shape, e.g. `repeat_text(param: str, multiplier: int = 1) -> str`.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self
            .params
            .iter()
            .map(|p| match &p.default {
                Some(default) => format!("{}: {} = {}", p.name, p.ty, default),
                None => format!("{}: {}", p.name, p.ty),
            })
            .collect();
        if self.accepts_context {
            parts.push(CONTEXT_PARAM.to_string());
        }
        format!("{}({}) -> {}", self.name, parts.join(", "), self.returns)
    }

    /// JSON schema for the tool's arguments, as published by discovery.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut property = Map::new();
            property.insert("type".into(), json!(param.ty.schema_type()));
            if let Some(description) = &param.description {
                property.insert("description".into(), json!(description));
            }
            if let Some(default) = &param.default {
                property.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(property));
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

pub struct DescriptorBuilder {
    name: String,
    summary: String,
    params: Vec<ParamSpec>,
    returns: ParamType,
    accepts_context: bool,
}

impl DescriptorBuilder {
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: ParamType) -> Self {
        self.returns = returns;
        self
    }

    pub fn with_context(mut self) -> Self {
        self.accepts_context = true;
        self
    }

    pub fn build(self) -> Result<OperationDescriptor, DescriptorError> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }

        for (index, param) in self.params.iter().enumerate() {
            if param.name.trim().is_empty() {
                return Err(DescriptorError::EmptyParamName(index, self.name.clone()));
            }
            if self.params[..index].iter().any(|p| p.name == param.name) {
                return Err(DescriptorError::DuplicateParam(
                    param.name.clone(),
                    self.name.clone(),
                ));
            }
            if let Some(default) = &param.default {
                if !default.is_null() && !param.ty.matches(default) {
                    return Err(DescriptorError::BadDefault {
                        param: param.name.clone(),
                        expected: param.ty,
                    });
                }
            }
        }

        Ok(OperationDescriptor {
            name: self.name,
            summary: self.summary,
            params: self.params,
            returns: self.returns,
            accepts_context: self.accepts_context,
        })
    }
}

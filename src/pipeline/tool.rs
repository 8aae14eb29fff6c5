//! Tool handlers and their descriptors

use crate::pipeline::{CallContext, OperationDescriptor};
use crate::types::ToolError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Named argument values of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn required(&self, name: &str) -> Result<&Value, ToolError> {
        self.0
            .get(name)
            .ok_or_else(|| ToolError::Internal(format!("argument '{}' was not supplied", name)))
    }

    fn mistyped(name: &str, expected: &str) -> ToolError {
        ToolError::Internal(format!("argument '{}' is not {}", name, expected))
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| Self::mistyped(name, "a string"))
    }

    pub fn i64(&self, name: &str) -> Result<i64, ToolError> {
        self.required(name)?
            .as_i64()
            .ok_or_else(|| Self::mistyped(name, "an integer"))
    }

    pub fn f64(&self, name: &str) -> Result<f64, ToolError> {
        self.required(name)?
            .as_f64()
            .ok_or_else(|| Self::mistyped(name, "a number"))
    }

    pub fn bool(&self, name: &str) -> Result<bool, ToolError> {
        self.required(name)?
            .as_bool()
            .ok_or_else(|| Self::mistyped(name, "a boolean"))
    }

    pub fn array(&self, name: &str) -> Result<&Vec<Value>, ToolError> {
        self.required(name)?
            .as_array()
            .ok_or_else(|| Self::mistyped(name, "a list"))
    }

    pub fn object(&self, name: &str) -> Result<&Map<String, Value>, ToolError> {
        self.required(name)?
            .as_object()
            .ok_or_else(|| Self::mistyped(name, "an object"))
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: CallContext, args: Arguments) -> Result<Value, ToolError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(CallContext, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn call(&self, ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        (self.0)(ctx, args).await
    }
}

/// A handler paired with the descriptor that discovery publishes for it.
#[derive(Clone)]
pub struct Tool {
    descriptor: Arc<OperationDescriptor>,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new<F, Fut>(descriptor: OperationDescriptor, body: F) -> Self
    where
        F: Fn(CallContext, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self::from_handler(Arc::new(descriptor), Arc::new(FnHandler(body)))
    }

    pub fn from_handler(descriptor: Arc<OperationDescriptor>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            descriptor,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<OperationDescriptor> {
        &self.descriptor
    }

    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }

    pub async fn call(&self, ctx: CallContext, args: Arguments) -> Result<Value, ToolError> {
        self.handler.call(ctx, args).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

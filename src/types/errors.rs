use thiserror::Error;

use crate::pipeline::ParamType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Missing required argument '{param}' (expected {expected})")]
    MissingArgument { param: String, expected: ParamType },

    #[error("Invalid value for '{param}': expected {expected}, got {value}")]
    Validation {
        param: String,
        expected: ParamType,
        value: String,
    },

    #[error("Unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("Parallel tools require a list of argument objects, got {found}")]
    NotAList { found: String },

    #[error("Item {index} in kwargs_list must be an object, got {found}")]
    ItemNotObject { index: usize, found: String },

    #[error("{kind}: {message}")]
    Operation { kind: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Domain failure raised by a tool body.
    pub fn operation(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Short type name used when logging the failure.
    pub fn kind(&self) -> &str {
        match self {
            Self::MissingArgument { .. } | Self::Validation { .. } | Self::UnexpectedArgument(_) => {
                "ValidationError"
            }
            Self::NotAList { .. } | Self::ItemNotObject { .. } => "BatchInputError",
            Self::Operation { kind, .. } => kind,
            Self::UnknownTool(_) => "UnknownOperationError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Message without the type prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Operation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingArgument { .. } | Self::Validation { .. } | Self::UnexpectedArgument(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Logger is closed")]
    Closed,

    #[error("Unknown destination type: {0}")]
    UnknownDestination(String),

    #[error("Destination '{0}' failed: {1}")]
    Destination(String, String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("Operation name must not be empty")]
    EmptyName,

    #[error("Parameter {0} of '{1}' has an empty name")]
    EmptyParamName(usize, String),

    #[error("Duplicate parameter '{0}' in '{1}'")]
    DuplicateParam(String, String),

    #[error("Default for '{param}' does not match declared type {expected}")]
    BadDefault { param: String, expected: ParamType },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Failed to parse config {0}: {1}")]
    Parse(String, toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;

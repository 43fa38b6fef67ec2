//! Engine error types

use crate::config::ConfigError;
use crate::providers::{ProviderError, ProviderType};
use thiserror::Error;

/// Errors surfaced by `operate`
#[derive(Debug, Error)]
pub enum OperateError {
    /// The vendor call failed; this is what triggers fallback
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A caller tool failed; aborts the current attempt
    #[error("Tool '{name}' failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Structured output did not satisfy the requested schema
    #[error("Structured output failed schema validation: {}", .errors.join("; "))]
    SchemaValidation { errors: Vec<String> },

    /// The requested output schema could not be used
    #[error("Invalid output schema: {0}")]
    InvalidSchema(String),

    /// A schema was requested but the vendor produced no structured answer
    #[error("Response did not contain structured output")]
    MissingStructuredOutput,

    #[error("Tool name '{0}' is reserved for structured output")]
    ReservedToolName(String),

    #[error("Duplicate tool name '{0}'")]
    DuplicateToolName(String),

    /// No transport was registered for the provider
    #[error("Provider '{0}' is not registered")]
    ProviderNotRegistered(ProviderType),

    /// No provider could be inferred for the model
    #[error("Cannot determine provider for model '{0}'")]
    UnknownModel(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl OperateError {
    /// The vendor error, when this failure came from a vendor call
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(error) => Some(error),
            _ => None,
        }
    }
}

//! Error types for the assistant crate.

use thiserror::Error;

use crate::schema::SchemaError;

/// Result type alias using the assistant error type.
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Error type for assistant operations.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Invalid construction or setter input.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool registration failure (duplicate names, empty schema).
    #[error("Registration error: {0}")]
    Registration(String),

    /// Tool schema definition failure.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A tool_choice value that is neither a generic choice the adapter
    /// supports nor a registered function name.
    #[error("invalid tool_choice '{choice}'")]
    InvalidToolChoice {
        /// The rejected value.
        choice: String,
    },

    /// A tool call referenced a tool/method that is not registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool's execution raised an error.
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Provider adapter error.
    #[error("LLM error: {0}")]
    Llm(#[from] switchboard_llm::LlmError),
}

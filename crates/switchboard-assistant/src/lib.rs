//! Assistant run loop and tool framework for Switchboard.
//!
//! This crate drives multi-turn, tool-calling conversations against any
//! [`switchboard_llm::ProviderAdapter`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Assistant (run loop / state machine)                       │
//! │  ready → in_progress → requires_action → completed | failed │
//! └─────────────────────────────────────────────────────────────┘
//!            │                  │
//!            ▼                  ▼
//!     ┌─────────────┐    ┌──────────────────────────┐
//!     │ProviderAdapter│  │ ToolDispatcher            │
//!     │(switchboard-  │  │  decode → resolve → call  │
//!     │ llm)          │  │  via ToolRegistry table   │
//!     └─────────────┘    └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use switchboard_assistant::{Assistant, tools::Calculator};
//! use switchboard_llm::{OpenAiAdapter, OpenAiConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut assistant = Assistant::builder()
//!     .with_adapter(OpenAiAdapter::new(OpenAiConfig::from_env()?)?)
//!     .with_instructions("You are an expert assistant")
//!     .with_tool(Calculator::new())
//!     .build()?;
//!
//! let messages = assistant.add_message_and_run("What is 2+2?", true).await?;
//! println!("{}", messages.last().unwrap().text());
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod dispatch;
pub mod error;
pub mod schema;
pub mod thread;
pub mod tool;
pub mod tools;
pub mod types;

pub use assistant::{Assistant, AssistantBuilder};
pub use dispatch::{ToolDispatcher, ToolExecutionCallback};
pub use error::{AssistantError, Result};
pub use schema::{
    ItemBuilder, ParamKind, ParamsBuilder, PropertySpec, SchemaError, ToolAction, ToolSchema,
    ToolSchemaBuilder,
};
pub use thread::Thread;
pub use tool::{ActionBinding, Tool, ToolError, ToolOutput, ToolRegistry, ToolResult};
pub use types::{MessageCallback, RunState, UsageCounters};

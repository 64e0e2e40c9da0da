//! Canonical chat model and per-provider adapters for Switchboard.
//!
//! This crate defines one internal message model and translates it to and
//! from each vendor's wire format behind the [`ProviderAdapter`] trait.
//! Callers (the assistant run loop, or anything else driving a
//! conversation) never branch on vendor identity — adding a vendor means
//! adding an adapter.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  ProviderAdapter trait                   │
//! │  - build_chat_params() -> vendor payload │
//! │  - chat() -> ChatResponse                │
//! │  - extract_tool_call() -> ToolCallRequest│
//! └──────────────────────────────────────────┘
//!            │
//!   ┌────────┼─────────┬─────────┬─────────┐
//!   ▼        ▼         ▼         ▼         ▼
//! OpenAI  Anthropic  Gemini   Mistral   Ollama
//! ```

pub mod adapter;
pub mod embeddings;
pub mod error;
pub mod message;
pub mod request;
pub mod response;
pub mod retry;

mod wire;

// Provider implementations
pub mod anthropic;
pub mod gemini;
pub mod mistral;
pub mod ollama;
pub mod openai;

pub use adapter::{
    ChunkHandler, FUNCTION_NAME_SEPARATOR, ProviderAdapter, SharedAdapter, decode_arguments,
    split_function_name,
};
pub use error::{LlmError, Result};
pub use message::{Message, Role, ToolCallRequest};
pub use request::{ChatRequest, ToolChoice, ToolFunction};
pub use response::{ChatResponse, Usage};
pub use retry::with_retry;

// Re-export embeddings
pub use embeddings::{
    Embedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder, cosine_similarity,
    euclidean_distance,
};

// Re-export provider adapters and configs
pub use anthropic::{AnthropicAdapter, AnthropicConfig};
pub use gemini::{GeminiAdapter, GeminiConfig};
pub use mistral::{MistralAdapter, MistralConfig};
pub use ollama::{OllamaAdapter, OllamaConfig};
pub use openai::{OpenAiAdapter, OpenAiConfig};

// Mock types for downstream test code
#[cfg(any(test, feature = "testing"))]
pub use adapter::{MockAdapter, MockOutcome};
#[cfg(any(test, feature = "testing"))]
pub use embeddings::MockEmbedder;

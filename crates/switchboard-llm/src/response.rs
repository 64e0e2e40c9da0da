//! Normalized chat response and token usage types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Usage
// ─────────────────────────────────────────────────────────────────────────────

/// Token usage reported by a provider.
///
/// Any field may be absent when the vendor does not report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: Option<u32>,
    /// Tokens in the completion.
    pub completion_tokens: Option<u32>,
    /// Total tokens, when the vendor reports one.
    pub total_tokens: Option<u32>,
}

impl Usage {
    /// Create usage counts.
    pub fn new(
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        total_tokens: Option<u32>,
    ) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// The total token count: the vendor's figure when present, otherwise
    /// the sum of both sub-counts when both are present.
    pub fn total(&self) -> Option<u32> {
        self.total_tokens
            .or_else(|| match (self.prompt_tokens, self.completion_tokens) {
                (Some(prompt), Some(completion)) => Some(prompt + completion),
                _ => None,
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Response
// ─────────────────────────────────────────────────────────────────────────────

/// A normalized chat response.
///
/// Tool calls are kept in the vendor's native shape; the adapter that
/// produced the response knows how to decode them (`extract_tool_call`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The model that generated the response.
    pub model: String,

    /// Assembled completion text, absent for pure tool-call turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Vendor-native tool call payloads, possibly empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,

    /// Token usage for this call.
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Create a plain text response.
    pub fn text(model: impl Into<String>, content: impl Into<String>, usage: Usage) -> Self {
        Self {
            model: model.into(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            usage,
        }
    }

    /// Create a tool-calling response.
    pub fn tool_calls(
        model: impl Into<String>,
        content: Option<String>,
        tool_calls: Vec<Value>,
        usage: Usage,
    ) -> Self {
        Self {
            model: model.into(),
            content,
            tool_calls,
            usage,
        }
    }

    /// Whether the response requests tool execution.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Completion text, or the empty string.
    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Canonical message model shared by every provider adapter.
//!
//! A [`Message`] is one conversational turn. Tool call payloads stay in the
//! vendor's native JSON shape on the message; the active adapter's
//! `extract_tool_call` decodes them into [`ToolCallRequest`]s at dispatch
//! time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Role
// ─────────────────────────────────────────────────────────────────────────────

/// The standard role of a message author.
///
/// Vendor-specific labels ("model", "function", ...) are mapped onto these
/// four roles by the provider adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Canonical lowercase label for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Map a role label onto the canonical role.
    ///
    /// Accepts the canonical labels plus the vendor aliases `model`
    /// (assistant) and `function` (tool). Returns `None` for anything else.
    pub fn from_label(label: &str) -> Option<Role> {
        match label {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" | "model" => Some(Role::Assistant),
            "tool" | "function" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// A single conversational turn.
///
/// Messages are immutable once constructed: the builder methods consume and
/// return `self`, and nothing mutates a message after it enters a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,

    /// Text content, absent for pure tool-call messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Optional image attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Pending tool invocation requests in the vendor's native shape.
    ///
    /// Only assistant messages carry these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,

    /// Correlation id when this message answers a tool call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            image_url: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message with no content (tool calls attached via
    /// [`Message::with_tool_calls`]).
    pub fn assistant_empty() -> Self {
        Self::new(Role::Assistant, None)
    }

    /// Create a tool-result message correlated to a tool call.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, Some(content.into()));
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Attach an image URL.
    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Attach vendor-native tool call payloads.
    pub fn with_tool_calls(mut self, tool_calls: Vec<Value>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attach a tool call correlation id.
    pub fn with_tool_call_id(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }

    /// Whether this message carries pending tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether this is a system message.
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Text content, or the empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ToolCallRequest
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded tool invocation request.
///
/// Produced by a provider adapter's `extract_tool_call` from the vendor's
/// native payload. For providers without call ids (Gemini) the function name
/// doubles as the correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque correlation token.
    pub id: String,
    /// Target tool name (registry key).
    pub tool_name: String,
    /// Target method on the tool.
    pub method_name: String,
    /// Decoded keyword arguments.
    pub arguments: serde_json::Map<String, Value>,
}

impl ToolCallRequest {
    /// The advertised function name, `"{tool_name}__{method_name}"`.
    pub fn function_name(&self) -> String {
        format!("{}__{}", self.tool_name, self.method_name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::Assistant.as_str(), "assistant");
        assert_eq!(Role::from_label("model"), Some(Role::Assistant));
        assert_eq!(Role::from_label("function"), Some(Role::Tool));
        assert_eq!(Role::from_label("narrator"), None);
    }

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello");
        assert!(!msg.has_tool_calls());

        let msg = Message::tool("4.0", "call_1");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_assistant_with_tool_calls() {
        let msg = Message::assistant_empty()
            .with_tool_calls(vec![json!({"id": "call_1", "function": {"name": "a__b"}})]);
        assert!(msg.has_tool_calls());
        assert!(msg.content.is_none());
    }

    #[test]
    fn test_message_serde_roundtrip() {
        let msg = Message::user("hi").with_image_url("https://example.com/cat.png");
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);

        // Absent fields stay off the wire
        assert!(!encoded.contains("tool_call_id"));
    }

    #[test]
    fn test_function_name() {
        let request = ToolCallRequest {
            id: "call_1".to_string(),
            tool_name: "calculator".to_string(),
            method_name: "execute".to_string(),
            arguments: serde_json::Map::new(),
        };
        assert_eq!(request.function_name(), "calculator__execute");
    }
}

//! The provider adapter abstraction.
//!
//! One [`ProviderAdapter`] implementation exists per LLM vendor. An adapter
//! owns the bidirectional translation between the canonical model
//! ([`ChatRequest`]/[`ChatResponse`]/[`Message`]) and one vendor's wire
//! format. The run loop depends only on this trait — adding a vendor means
//! adding an adapter, never touching the loop.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{LlmError, Result};
use crate::message::{Message, Role, ToolCallRequest};
use crate::request::ChatRequest;
use crate::response::ChatResponse;

/// Separator between a tool name and a method name in advertised function
/// names (`"calculator__execute"`).
pub const FUNCTION_NAME_SEPARATOR: &str = "__";

/// Callback invoked once per incremental chunk of a streamed response.
///
/// The handler must not drive the run loop that issued the request.
pub type ChunkHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// An adapter that can be shared across threads.
pub type SharedAdapter = Arc<dyn ProviderAdapter>;

// ─────────────────────────────────────────────────────────────────────────────
// Provider Adapter Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Bidirectional translation layer between the canonical chat model and one
/// vendor's wire format.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The adapter's name (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Whether the vendor accepts a first-class in-band system message.
    ///
    /// Adapters returning `false` deliver instructions through a top-level
    /// request field instead; the run loop never needs to know which.
    fn supports_system_message(&self) -> bool;

    /// The closed set of generic tool_choice labels the vendor supports,
    /// drawn from `{"auto", "none", "any", "tool"}`.
    fn allowed_tool_choices(&self) -> &[&str];

    /// The role labels the vendor accepts for caller-constructed messages.
    fn allowed_roles(&self) -> &[&str];

    /// Construct a canonical [`Message`] from a vendor role label, rejecting
    /// labels outside [`ProviderAdapter::allowed_roles`].
    fn build_message(
        &self,
        role: &str,
        content: Option<String>,
        image_url: Option<String>,
        tool_calls: Vec<Value>,
        tool_call_id: Option<String>,
    ) -> Result<Message> {
        let canonical = self.validate_role(role)?;
        let mut message = Message {
            role: canonical,
            content,
            image_url,
            tool_calls,
            tool_call_id,
        };
        if message.has_tool_calls() && message.role != Role::Assistant {
            return Err(LlmError::InvalidRole {
                role: role.to_string(),
                provider: self.name().to_string(),
            });
        }
        message.image_url = message.image_url.filter(|url| !url.is_empty());
        Ok(message)
    }

    /// Map a role label to the canonical role, erroring on labels the
    /// vendor does not accept.
    fn validate_role(&self, role: &str) -> Result<Role> {
        if !self.allowed_roles().contains(&role) {
            return Err(LlmError::InvalidRole {
                role: role.to_string(),
                provider: self.name().to_string(),
            });
        }
        Role::from_label(role).ok_or_else(|| LlmError::InvalidRole {
            role: role.to_string(),
            provider: self.name().to_string(),
        })
    }

    /// Serialize a [`ChatRequest`] into the vendor's full request payload.
    fn build_chat_params(&self, request: &ChatRequest) -> Result<Value>;

    /// Decode one vendor-native tool call payload.
    fn extract_tool_call(&self, raw: &Value) -> Result<ToolCallRequest>;

    /// Execute a blocking chat call.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Execute a chat call, invoking `on_chunk` once per incremental piece
    /// of completion text.
    ///
    /// The default implementation performs a regular call and invokes the
    /// handler once with the assembled text; adapters for vendors with
    /// server-sent-event streaming override this.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkHandler,
    ) -> Result<ChatResponse> {
        let response = self.chat(request).await?;
        if let Some(text) = response.content.as_deref() {
            if !text.is_empty() {
                on_chunk(text);
            }
        }
        Ok(response)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared Decoding Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Split an advertised function name back into `(tool_name, method_name)`.
///
/// The registry advertises every action as `"{tool_name}__{method_name}"`;
/// the tool name itself may not contain the separator.
pub fn split_function_name(name: &str) -> Result<(String, String)> {
    match name.split_once(FUNCTION_NAME_SEPARATOR) {
        Some((tool_name, method_name)) if !tool_name.is_empty() && !method_name.is_empty() => {
            Ok((tool_name.to_string(), method_name.to_string()))
        }
        _ => Err(LlmError::MalformedToolCall(format!(
            "function name '{}' does not follow the 'tool{}method' convention",
            name, FUNCTION_NAME_SEPARATOR
        ))),
    }
}

/// Decode tool call arguments into a key/value map.
///
/// Accepts a JSON-encoded string (parsed) or an already-decoded object
/// (passed through). Anything else, including unparsable strings, is a
/// descriptive error — never a silent default.
pub fn decode_arguments(raw: &Value) -> Result<Map<String, Value>> {
    match raw {
        Value::Object(map) => Ok(map.clone()),
        Value::String(encoded) => {
            let parsed: Value = serde_json::from_str(encoded).map_err(|e| {
                LlmError::MalformedToolCall(format!(
                    "tool call arguments are not valid JSON: {} (input: {})",
                    e, encoded
                ))
            })?;
            match parsed {
                Value::Object(map) => Ok(map),
                other => Err(LlmError::MalformedToolCall(format!(
                    "tool call arguments must decode to an object, got {}",
                    json_type_name(&other)
                ))),
            }
        }
        Value::Null => Ok(Map::new()),
        other => Err(LlmError::MalformedToolCall(format!(
            "tool call arguments must be an object or JSON string, got {}",
            json_type_name(other)
        ))),
    }
}

/// Human-readable name for a JSON value type.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted outcome for the mock adapter.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this response.
    Success(ChatResponse),
    /// Fail the call with an API error carrying this message.
    Error(String),
}

/// A mock adapter for deterministic testing of the run loop.
///
/// Returns scripted responses in order and records every request it sees.
/// Tool call payloads use the OpenAI-style envelope so `extract_tool_call`
/// round-trips them like a real adapter.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct MockAdapter {
    outcomes: std::sync::Mutex<Vec<MockOutcome>>,
    requests: std::sync::Mutex<Vec<ChatRequest>>,
}

#[cfg(any(test, feature = "testing"))]
impl MockAdapter {
    /// Create a mock adapter returning the given responses in order.
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::with_outcomes(responses.into_iter().map(MockOutcome::Success).collect())
    }

    /// Create a mock adapter with explicit success/error outcomes.
    pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock adapter with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![ChatResponse::text(
            "mock-model",
            text,
            crate::response::Usage::new(Some(10), Some(20), None),
        )])
    }

    /// Build an OpenAI-style tool call payload for scripting responses.
    pub fn tool_call_payload(id: &str, function_name: &str, arguments: Value) -> Value {
        serde_json::json!({
            "id": id,
            "type": "function",
            "function": {
                "name": function_name,
                "arguments": arguments.to_string(),
            }
        })
    }

    /// All requests made against this adapter.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of chat calls made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_system_message(&self) -> bool {
        true
    }

    fn allowed_tool_choices(&self) -> &[&str] {
        &["auto", "none", "any", "tool"]
    }

    fn allowed_roles(&self) -> &[&str] {
        &["system", "user", "assistant", "tool"]
    }

    fn build_chat_params(&self, request: &ChatRequest) -> Result<Value> {
        Ok(serde_json::to_value(request)?)
    }

    fn extract_tool_call(&self, raw: &Value) -> Result<ToolCallRequest> {
        let id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::MalformedToolCall("missing tool call id".to_string()))?;
        let function = raw.get("function").ok_or_else(|| {
            LlmError::MalformedToolCall("missing function object".to_string())
        })?;
        let name = function
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::MalformedToolCall("missing function name".to_string()))?;
        let (tool_name, method_name) = split_function_name(name)?;
        let arguments = decode_arguments(function.get("arguments").unwrap_or(&Value::Null))?;

        Ok(ToolCallRequest {
            id: id.to_string(),
            tool_name,
            method_name,
            arguments,
        })
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Err(LlmError::Api {
                provider: "mock".to_string(),
                status: 500,
                message: "MockAdapter: no more scripted responses".to_string(),
            });
        }
        match outcomes.remove(0) {
            MockOutcome::Success(response) => Ok(response),
            MockOutcome::Error(message) => Err(LlmError::Api {
                provider: "mock".to_string(),
                status: 500,
                message,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Usage;
    use serde_json::json;

    #[test]
    fn test_split_function_name() {
        assert_eq!(
            split_function_name("calculator__execute").unwrap(),
            ("calculator".to_string(), "execute".to_string())
        );
        // Method names keep any further separators
        assert_eq!(
            split_function_name("store__get__all").unwrap(),
            ("store".to_string(), "get__all".to_string())
        );
        assert!(split_function_name("no_separator").is_err());
        assert!(split_function_name("__method").is_err());
        assert!(split_function_name("tool__").is_err());
    }

    #[test]
    fn test_decode_arguments_object_passthrough() {
        let args = decode_arguments(&json!({"input": "2+2"})).unwrap();
        assert_eq!(args.get("input"), Some(&json!("2+2")));
    }

    #[test]
    fn test_decode_arguments_json_string() {
        let args = decode_arguments(&json!("{\"input\": \"2+2\"}")).unwrap();
        assert_eq!(args.get("input"), Some(&json!("2+2")));
    }

    #[test]
    fn test_decode_arguments_invalid() {
        let err = decode_arguments(&json!("{not json")).unwrap_err();
        assert!(matches!(err, LlmError::MalformedToolCall(_)));
        assert!(err.to_string().contains("not valid JSON"));

        let err = decode_arguments(&json!(42)).unwrap_err();
        assert!(err.to_string().contains("number"));

        let err = decode_arguments(&json!("[1, 2]")).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_decode_arguments_null_is_empty() {
        assert!(decode_arguments(&Value::Null).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_adapter_scripted_responses() {
        let adapter = MockAdapter::new(vec![
            ChatResponse::text("mock-model", "First", Usage::default()),
            ChatResponse::text("mock-model", "Second", Usage::default()),
        ]);

        let request = ChatRequest::new(vec![Message::user("hi")]);
        assert_eq!(adapter.chat(&request).await.unwrap().text_content(), "First");
        assert_eq!(
            adapter.chat(&request).await.unwrap().text_content(),
            "Second"
        );
        assert_eq!(adapter.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_adapter_exhausted() {
        let adapter = MockAdapter::new(vec![]);
        let request = ChatRequest::new(vec![Message::user("hi")]);
        assert!(adapter.chat(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_adapter_scripted_error() {
        let adapter = MockAdapter::with_outcomes(vec![MockOutcome::Error(
            "upstream exploded".to_string(),
        )]);
        let request = ChatRequest::new(vec![Message::user("hi")]);
        let err = adapter.chat(&request).await.unwrap_err();
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn test_mock_adapter_tool_call_roundtrip() {
        let adapter = MockAdapter::new(vec![]);
        let payload = MockAdapter::tool_call_payload(
            "call_1",
            "calculator__execute",
            json!({"input": "2+2"}),
        );

        let decoded = adapter.extract_tool_call(&payload).unwrap();
        assert_eq!(decoded.id, "call_1");
        assert_eq!(decoded.tool_name, "calculator");
        assert_eq!(decoded.method_name, "execute");
        assert_eq!(decoded.arguments.get("input"), Some(&json!("2+2")));
    }

    #[test]
    fn test_build_message_validates_role() {
        let adapter = MockAdapter::new(vec![]);

        let message = adapter
            .build_message("user", Some("hello".to_string()), None, vec![], None)
            .unwrap();
        assert_eq!(message.role, Role::User);

        let err = adapter
            .build_message("narrator", Some("hello".to_string()), None, vec![], None)
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRole { .. }));
    }

    #[test]
    fn test_build_message_rejects_tool_calls_on_non_assistant() {
        let adapter = MockAdapter::new(vec![]);
        let err = adapter
            .build_message("user", None, None, vec![json!({"id": "x"})], None)
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRole { .. }));
    }

    #[tokio::test]
    async fn test_default_chat_stream_single_chunk() {
        let adapter = MockAdapter::with_text("Hello, world");
        let request = ChatRequest::new(vec![Message::user("hi")]);

        let chunks = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = chunks.clone();
        let handler: ChunkHandler = Arc::new(move |chunk: &str| {
            sink.lock().unwrap().push(chunk.to_string());
        });

        let response = adapter.chat_stream(&request, handler).await.unwrap();
        assert_eq!(response.text_content(), "Hello, world");
        assert_eq!(chunks.lock().unwrap().as_slice(), ["Hello, world"]);
    }
}

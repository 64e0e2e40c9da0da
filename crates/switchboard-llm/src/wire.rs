//! Shared wire-format helpers for OpenAI-compatible chat APIs.
//!
//! OpenAI, Mistral, and Ollama all speak close dialects of the same chat
//! completion format; the conversion between the canonical model and that
//! format lives here once. Vendor differences (tool_choice spelling, extra
//! request fields, auth) stay in the individual adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::adapter::{decode_arguments, split_function_name};
use crate::error::{LlmError, Result};
use crate::message::{Message, Role, ToolCallRequest};
use crate::request::{ChatRequest, ToolFunction};
use crate::response::{ChatResponse, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Outbound Messages
// ─────────────────────────────────────────────────────────────────────────────

/// One message in the OpenAI-compatible wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Convert canonical messages (plus optional instructions) into the
/// OpenAI-compatible message array.
///
/// Instructions become a leading in-band system message. A message's image
/// URL is delivered as a multimodal content part next to its text.
pub(crate) fn to_wire_messages(request: &ChatRequest) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(request.messages.len() + 1);

    if let Some(ref instructions) = request.instructions {
        wire.push(WireMessage {
            role: "system".to_string(),
            content: Some(json!(instructions)),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for message in &request.messages {
        wire.push(to_wire_message(message));
    }

    wire
}

fn to_wire_message(message: &Message) -> WireMessage {
    let content = match (&message.content, &message.image_url) {
        (Some(text), Some(image_url)) => Some(json!([
            {"type": "text", "text": text},
            {"type": "image_url", "image_url": {"url": image_url}},
        ])),
        (None, Some(image_url)) => Some(json!([
            {"type": "image_url", "image_url": {"url": image_url}},
        ])),
        (Some(text), None) => Some(json!(text)),
        (None, None) => None,
    };

    WireMessage {
        role: match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
        .to_string(),
        content,
        tool_calls: if message.tool_calls.is_empty() {
            None
        } else {
            Some(message.tool_calls.clone())
        },
        tool_call_id: message.tool_call_id.clone(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

/// Convert tool functions into the `{"type": "function", ...}` envelope,
/// rejecting duplicate advertised names.
pub(crate) fn to_wire_tools(tools: &[ToolFunction]) -> Result<Vec<Value>> {
    let mut seen = std::collections::HashSet::new();
    let mut wire = Vec::with_capacity(tools.len());

    for tool in tools {
        if !seen.insert(&tool.name) {
            return Err(LlmError::Config(format!(
                "duplicate tool function name: {}",
                tool.name
            )));
        }
        wire.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(wire)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Call Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Decode an OpenAI-style tool call payload:
/// `{"id": ..., "function": {"name": "tool__method", "arguments": "{...}"}}`.
pub(crate) fn extract_wire_tool_call(raw: &Value) -> Result<ToolCallRequest> {
    let id = raw
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LlmError::MalformedToolCall("missing tool call id".to_string()))?;
    let function = raw
        .get("function")
        .ok_or_else(|| LlmError::MalformedToolCall("missing function object".to_string()))?;
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

// ─────────────────────────────────────────────────────────────────────────────
// Inbound Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    pub model: String,
    pub choices: Vec<WireChoice>,
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    pub message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoiceMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl From<Option<WireUsage>> for Usage {
    fn from(wire: Option<WireUsage>) -> Self {
        match wire {
            Some(usage) => {
                let total = usage.total_tokens.or_else(|| {
                    match (usage.prompt_tokens, usage.completion_tokens) {
                        (Some(prompt), Some(completion)) => Some(prompt + completion),
                        _ => None,
                    }
                });
                Usage::new(usage.prompt_tokens, usage.completion_tokens, total)
            }
            None => Usage::default(),
        }
    }
}

/// Normalize an OpenAI-compatible response body.
pub(crate) fn parse_wire_response(body: &str) -> Result<ChatResponse> {
    let parsed: WireResponse =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("response carried no choices".to_string()))?;

    // Empty strings are as good as absent content
    let content = choice.message.content.filter(|text| !text.is_empty());

    Ok(ChatResponse {
        model: parsed.model,
        content,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
        usage: parsed.usage.into(),
    })
}

/// Typed error body shared by the OpenAI-compatible vendors.
#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorResponse {
    pub error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorDetail {
    pub message: String,
}

/// Map an error response body + status onto the error taxonomy.
pub(crate) fn wire_error(provider: &str, status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<WireErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        401 | 403 => LlmError::Auth(format!("{}: {}", provider, message)),
        429 => LlmError::RateLimit(format!("{}: {}", provider, message)),
        _ => LlmError::Api {
            provider: provider.to_string(),
            status,
            message,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_messages_with_instructions() {
        let request = ChatRequest::new(vec![Message::user("Hello")])
            .with_instructions("You are an expert assistant");

        let wire = to_wire_messages(&request);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[0].content, Some(json!("You are an expert assistant")));
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[1].content, Some(json!("Hello")));
    }

    #[test]
    fn test_to_wire_message_tool_exchange() {
        let tool_call = json!({
            "id": "call_1",
            "type": "function",
            "function": {"name": "calculator__execute", "arguments": "{\"input\":\"2+2\"}"}
        });
        let request = ChatRequest::new(vec![
            Message::assistant_empty().with_tool_calls(vec![tool_call.clone()]),
            Message::tool("4.0", "call_1"),
        ]);

        let wire = to_wire_messages(&request);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "assistant");
        assert!(wire[0].content.is_none());
        assert_eq!(wire[0].tool_calls.as_ref().unwrap()[0], tool_call);
        assert_eq!(wire[1].role, "tool");
        assert_eq!(wire[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_to_wire_message_with_image() {
        let request =
            ChatRequest::new(vec![
                Message::user("What is this?").with_image_url("https://example.com/cat.png"),
            ]);

        let wire = to_wire_messages(&request);
        let parts = wire[0].content.as_ref().unwrap().as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["image_url"]["url"], "https://example.com/cat.png");
    }

    #[test]
    fn test_to_wire_tools_rejects_duplicates() {
        let tool = ToolFunction::new("calc__run", "Run", json!({"type": "object"}));
        let err = to_wire_tools(&[tool.clone(), tool]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_extract_wire_tool_call_roundtrip() {
        let raw = json!({
            "id": "call_9",
            "type": "function",
            "function": {
                "name": "news_retriever__get_top_headlines",
                "arguments": "{\"country\": \"us\", \"page_size\": 10}"
            }
        });

        let decoded = extract_wire_tool_call(&raw).unwrap();
        assert_eq!(decoded.id, "call_9");
        assert_eq!(decoded.tool_name, "news_retriever");
        assert_eq!(decoded.method_name, "get_top_headlines");
        assert_eq!(decoded.arguments.get("country"), Some(&json!("us")));
    }

    #[test]
    fn test_extract_wire_tool_call_missing_id() {
        let raw = json!({"function": {"name": "a__b", "arguments": "{}"}});
        let err = extract_wire_tool_call(&raw).unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_parse_wire_response_text() {
        let body = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;

        let response = parse_wire_response(body).unwrap();
        assert_eq!(response.text_content(), "Hi!");
        assert!(!response.has_tool_calls());
        assert_eq!(response.usage.total(), Some(15));
    }

    #[test]
    fn test_parse_wire_response_tool_calls_and_usage_fallback() {
        let body = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "call_1", "type": "function",
                 "function": {"name": "calculator__execute", "arguments": "{\"input\":\"2+2\"}"}}
            ]}}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 15}
        }"#;

        let response = parse_wire_response(body).unwrap();
        assert!(response.has_tool_calls());
        assert!(response.content.is_none());
        assert_eq!(response.usage.total(), Some(35));
    }

    #[test]
    fn test_parse_wire_response_no_choices() {
        let err = parse_wire_response(r#"{"model": "m", "choices": []}"#).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn test_wire_error_mapping() {
        let body = r#"{"error": {"message": "bad key", "type": "invalid_request_error"}}"#;
        assert!(matches!(wire_error("openai", 401, body), LlmError::Auth(_)));
        assert!(matches!(
            wire_error("openai", 429, body),
            LlmError::RateLimit(_)
        ));
        assert!(matches!(
            wire_error("openai", 500, body),
            LlmError::Api { status: 500, .. }
        ));
        // Unparsable bodies fall back to the raw text
        let err = wire_error("openai", 502, "bad gateway");
        assert!(err.to_string().contains("bad gateway"));
    }
}

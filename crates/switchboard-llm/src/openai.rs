//! OpenAI chat completions adapter.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, header};
use serde_json::{Value, json};
use std::time::Duration;

use crate::adapter::{ChunkHandler, ProviderAdapter};
use crate::error::{LlmError, Result};
use crate::message::ToolCallRequest;
use crate::request::{ChatRequest, ToolChoice};
use crate::response::{ChatResponse, Usage};
use crate::retry::with_retry;
use crate::wire;

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI adapter.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Default model for requests that do not override it.
    pub model: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
}

impl OpenAiConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Create config from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LlmError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Adapter for the OpenAI chat completions API.
pub struct OpenAiAdapter {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create an adapter from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
    }

    fn translate_tool_choice(&self, choice: &ToolChoice) -> Result<Value> {
        match choice {
            ToolChoice::Auto => Ok(json!("auto")),
            ToolChoice::None => Ok(json!("none")),
            // OpenAI spells "must call some tool" as "required"
            ToolChoice::Any => Ok(json!("required")),
            ToolChoice::Tool { name } => Ok(json!({
                "type": "function",
                "function": {"name": name},
            })),
        }
    }

    async fn post_chat(&self, payload: &Value) -> Result<ChatResponse> {
        let response = self
            .add_headers(self.client.post(self.completions_url()))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(wire::wire_error(self.name(), status.as_u16(), &body));
        }

        wire::parse_wire_response(&body)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
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
        let messages = wire::to_wire_messages(request);

        let mut payload = json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model),
            "messages": messages,
        });
        let body = payload
            .as_object_mut()
            .expect("payload is constructed as an object");

        if !request.tools.is_empty() {
            body.insert("tools".to_string(), json!(wire::to_wire_tools(&request.tools)?));
            body.insert(
                "parallel_tool_calls".to_string(),
                json!(request.parallel_tool_calls),
            );
        }
        if let Some(ref choice) = request.tool_choice {
            body.insert(
                "tool_choice".to_string(),
                self.translate_tool_choice(choice)?,
            );
        }
        if let Some(temperature) = request.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }

        Ok(payload)
    }

    fn extract_tool_call(&self, raw: &Value) -> Result<ToolCallRequest> {
        wire::extract_wire_tool_call(raw)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let payload = self.build_chat_params(request)?;

        tracing::debug!(
            adapter = self.name(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            self.name(),
            || async { self.post_chat(&payload).await },
        )
        .await
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkHandler,
    ) -> Result<ChatResponse> {
        let mut payload = self.build_chat_params(request)?;
        payload
            .as_object_mut()
            .expect("payload is constructed as an object")
            .insert("stream".to_string(), json!(true));

        let response = self
            .add_headers(self.client.post(self.completions_url()))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(wire::wire_error(self.name(), status.as_u16(), &body));
        }

        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let mut assembler = StreamAssembler::new(model);
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(bytes) = byte_stream.next().await {
            let bytes = bytes.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..=line_end);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    return Ok(assembler.finish());
                }
                assembler.push_chunk(data, &on_chunk);
            }
        }

        Ok(assembler.finish())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Assembly
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates streamed delta chunks into a full [`ChatResponse`].
struct StreamAssembler {
    model: String,
    content: String,
    // Partial tool calls keyed by stream index: (id, name, arguments fragment)
    tool_calls: Vec<(String, String, String)>,
    usage: Usage,
}

impl StreamAssembler {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            content: String::new(),
            tool_calls: Vec::new(),
            usage: Usage::default(),
        }
    }

    fn push_chunk(&mut self, data: &str, on_chunk: &ChunkHandler) {
        let Ok(chunk) = serde_json::from_str::<Value>(data) else {
            tracing::warn!(adapter = "openai", "Skipping unparsable stream chunk");
            return;
        };

        if let Some(model) = chunk.get("model").and_then(|v| v.as_str()) {
            self.model = model.to_string();
        }
        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            self.usage = Usage::new(
                usage.get("prompt_tokens").and_then(|v| v.as_u64()).map(|v| v as u32),
                usage
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32),
                usage.get("total_tokens").and_then(|v| v.as_u64()).map(|v| v as u32),
            );
        }

        let Some(delta) = chunk
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
        else {
            return;
        };

        if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                self.content.push_str(text);
                on_chunk(text);
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            for call in calls {
                let index = call.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                while self.tool_calls.len() <= index {
                    self.tool_calls
                        .push((String::new(), String::new(), String::new()));
                }
                let slot = &mut self.tool_calls[index];
                if let Some(id) = call.get("id").and_then(|v| v.as_str()) {
                    slot.0 = id.to_string();
                }
                if let Some(name) = call
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str())
                {
                    slot.1.push_str(name);
                }
                if let Some(fragment) = call
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|v| v.as_str())
                {
                    slot.2.push_str(fragment);
                }
            }
        }
    }

    fn finish(self) -> ChatResponse {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|(id, name, arguments)| {
                json!({
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments},
                })
            })
            .collect();

        ChatResponse {
            model: self.model,
            content: if self.content.is_empty() {
                None
            } else {
                Some(self.content)
            },
            tool_calls,
            usage: self.usage,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::request::ToolFunction;
    use std::sync::Arc;

    fn adapter() -> OpenAiAdapter {
        OpenAiAdapter::new(OpenAiConfig::new("test-key")).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::new("key");
        assert_eq!(config.base_url, DEFAULT_API_BASE);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_completions_url() {
        let adapter =
            OpenAiAdapter::new(OpenAiConfig::new("key").with_base_url("http://localhost:8080/"))
                .unwrap();
        assert_eq!(
            adapter.completions_url(),
            "http://localhost:8080/chat/completions"
        );
    }

    #[test]
    fn test_build_chat_params_basic() {
        let request = ChatRequest::new(vec![Message::user("Hello")])
            .with_instructions("Be brief.")
            .with_temperature(0.3);

        let payload = adapter().build_chat_params(&request).unwrap();
        assert_eq!(payload["model"], DEFAULT_MODEL);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "Hello");
        assert_eq!(payload["temperature"], 0.3);
        assert!(payload.get("tools").is_none());
        assert!(payload.get("parallel_tool_calls").is_none());
    }

    #[test]
    fn test_build_chat_params_with_tools() {
        let request = ChatRequest::new(vec![Message::user("calc")])
            .with_tools(vec![ToolFunction::new(
                "calculator__execute",
                "Evaluate an expression",
                json!({"type": "object", "properties": {"input": {"type": "string"}}}),
            )])
            .with_tool_choice(ToolChoice::Any)
            .with_parallel_tool_calls(false);

        let payload = adapter().build_chat_params(&request).unwrap();
        assert_eq!(payload["tools"][0]["type"], "function");
        assert_eq!(payload["tools"][0]["function"]["name"], "calculator__execute");
        assert_eq!(payload["tool_choice"], "required");
        assert_eq!(payload["parallel_tool_calls"], false);
    }

    #[test]
    fn test_tool_choice_translation() {
        let adapter = adapter();
        assert_eq!(
            adapter.translate_tool_choice(&ToolChoice::Auto).unwrap(),
            json!("auto")
        );
        assert_eq!(
            adapter.translate_tool_choice(&ToolChoice::None).unwrap(),
            json!("none")
        );
        let specific = adapter
            .translate_tool_choice(&ToolChoice::Tool {
                name: "calculator__execute".to_string(),
            })
            .unwrap();
        assert_eq!(specific["function"]["name"], "calculator__execute");
    }

    #[test]
    fn test_extract_tool_call() {
        let raw = json!({
            "id": "call_1",
            "type": "function",
            "function": {"name": "calculator__execute", "arguments": "{\"input\": \"2+2\"}"}
        });
        let decoded = adapter().extract_tool_call(&raw).unwrap();
        assert_eq!(decoded.id, "call_1");
        assert_eq!(decoded.tool_name, "calculator");
        assert_eq!(decoded.method_name, "execute");
    }

    #[test]
    fn test_stream_assembler_text() {
        let chunks = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = chunks.clone();
        let handler: ChunkHandler = Arc::new(move |chunk: &str| {
            sink.lock().unwrap().push(chunk.to_string());
        });

        let mut assembler = StreamAssembler::new("gpt-4o-mini");
        assembler.push_chunk(
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            &handler,
        );
        assembler.push_chunk(
            r#"{"choices":[{"delta":{"content":"lo!"}}]}"#,
            &handler,
        );

        let response = assembler.finish();
        assert_eq!(response.text_content(), "Hello!");
        assert_eq!(chunks.lock().unwrap().join(""), "Hello!");
    }

    #[test]
    fn test_stream_assembler_tool_call_fragments() {
        let handler: ChunkHandler = Arc::new(|_| {});

        let mut assembler = StreamAssembler::new("gpt-4o-mini");
        assembler.push_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"calculator__execute","arguments":""}}]}}]}"#,
            &handler,
        );
        assembler.push_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"input\":"}}]}}]}"#,
            &handler,
        );
        assembler.push_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"2+2\"}"}}]}}]}"#,
            &handler,
        );

        let response = assembler.finish();
        assert!(response.has_tool_calls());
        let decoded = adapter().extract_tool_call(&response.tool_calls[0]).unwrap();
        assert_eq!(decoded.id, "call_1");
        assert_eq!(decoded.arguments.get("input"), Some(&json!("2+2")));
    }
}

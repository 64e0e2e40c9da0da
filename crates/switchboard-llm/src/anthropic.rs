//! Anthropic Messages API adapter.
//!
//! Anthropic has no in-band system role — instructions travel in the
//! top-level `system` field — and tool results are user-role
//! `tool_result` content blocks. Both differences are hidden here.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, header};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::adapter::{ChunkHandler, ProviderAdapter, decode_arguments, split_function_name};
use crate::error::{LlmError, Result};
use crate::message::{Message, Role, ToolCallRequest};
use crate::request::{ChatRequest, ToolChoice};
use crate::response::{ChatResponse, Usage};
use crate::retry::with_retry;

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// Default API version header.
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Default model.
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// The Messages API requires max_tokens; used when the request sets none.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Anthropic adapter.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// API version header.
    pub api_version: String,

    /// Default model for requests that do not override it.
    pub model: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
}

impl AnthropicConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Create config from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LlmError::Config("ANTHROPIC_API_KEY environment variable not set".to_string())
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
}

// ─────────────────────────────────────────────────────────────────────────────
// Anthropic Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Adapter for the Anthropic Messages API.
pub struct AnthropicAdapter {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create an adapter from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(AnthropicConfig::from_env()?)
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header(header::CONTENT_TYPE, "application/json")
    }

    fn to_wire_message(message: &Message) -> Value {
        match message.role {
            Role::Tool => {
                // Tool results ride as user-role tool_result blocks
                json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": message.tool_call_id.as_deref().unwrap_or_default(),
                        "content": message.text(),
                    }],
                })
            }
            Role::Assistant if message.has_tool_calls() => {
                let mut blocks = Vec::new();
                if let Some(text) = message.content.as_deref() {
                    if !text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text}));
                    }
                }
                // tool_calls are native tool_use blocks from a prior response
                blocks.extend(message.tool_calls.iter().cloned());
                json!({"role": "assistant", "content": blocks})
            }
            role => {
                let label = if role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                };
                match &message.image_url {
                    Some(image_url) => json!({
                        "role": label,
                        "content": [
                            {"type": "text", "text": message.text()},
                            {"type": "image", "source": {"type": "url", "url": image_url}},
                        ],
                    }),
                    None => json!({"role": label, "content": message.text()}),
                }
            }
        }
    }

    fn translate_tool_choice(&self, choice: &ToolChoice, parallel: bool) -> Value {
        let mut translated = match choice {
            ToolChoice::Auto => json!({"type": "auto"}),
            ToolChoice::None => json!({"type": "none"}),
            ToolChoice::Any => json!({"type": "any"}),
            ToolChoice::Tool { name } => json!({"type": "tool", "name": name}),
        };
        if !parallel && !matches!(choice, ToolChoice::None) {
            translated
                .as_object_mut()
                .expect("tool_choice is constructed as an object")
                .insert("disable_parallel_tool_use".to_string(), json!(true));
        }
        translated
    }

    async fn post_chat(&self, payload: &Value) -> Result<ChatResponse> {
        let response = self
            .add_headers(self.client.post(self.messages_url()))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &body));
        }

        parse_response(&body)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_system_message(&self) -> bool {
        false
    }

    fn allowed_tool_choices(&self) -> &[&str] {
        &["auto", "none", "any", "tool"]
    }

    fn allowed_roles(&self) -> &[&str] {
        &["user", "assistant", "tool"]
    }

    fn build_chat_params(&self, request: &ChatRequest) -> Result<Value> {
        let messages: Vec<Value> = request.messages.iter().map(Self::to_wire_message).collect();

        let mut payload = json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model),
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        let body = payload
            .as_object_mut()
            .expect("payload is constructed as an object");

        if let Some(ref instructions) = request.instructions {
            body.insert("system".to_string(), json!(instructions));
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body.insert("tools".to_string(), json!(tools));
        }
        if let Some(ref choice) = request.tool_choice {
            body.insert(
                "tool_choice".to_string(),
                self.translate_tool_choice(choice, request.parallel_tool_calls),
            );
        }
        if let Some(temperature) = request.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }

        Ok(payload)
    }

    fn extract_tool_call(&self, raw: &Value) -> Result<ToolCallRequest> {
        let id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::MalformedToolCall("missing tool_use id".to_string()))?;
        let name = raw
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::MalformedToolCall("missing tool_use name".to_string()))?;

        let (tool_name, method_name) = split_function_name(name)?;
        let arguments = decode_arguments(raw.get("input").unwrap_or(&Value::Null))?;

        Ok(ToolCallRequest {
            id: id.to_string(),
            tool_name,
            method_name,
            arguments,
        })
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
            .add_headers(self.client.post(self.messages_url()))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &body));
        }

        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let mut assembler = SseAssembler::new(model);
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(bytes) = byte_stream.next().await {
            let bytes = bytes.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..=line_end);

                if let Some(data) = line.strip_prefix("data: ") {
                    if assembler.push_event(data, &on_chunk)? {
                        return Ok(assembler.finish());
                    }
                }
            }
        }

        Ok(assembler.finish())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Parsing
// ─────────────────────────────────────────────────────────────────────────────

fn parse_response(body: &str) -> Result<ChatResponse> {
    let parsed: Value =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    let blocks = parsed
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| LlmError::MalformedResponse("response carried no content".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(piece) = block.get("text").and_then(|t| t.as_str()) {
                    text.push_str(piece);
                }
            }
            Some("tool_use") => tool_calls.push(block.clone()),
            _ => {}
        }
    }

    let usage = parsed.get("usage").map(parse_usage).unwrap_or_default();

    Ok(ChatResponse {
        model: parsed
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string(),
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls,
        usage,
    })
}

fn parse_usage(usage: &Value) -> Usage {
    let input = usage
        .get("input_tokens")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);
    let output = usage
        .get("output_tokens")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);
    let total = match (input, output) {
        (Some(i), Some(o)) => Some(i + o),
        _ => None,
    };
    Usage::new(input, output, total)
}

fn parse_error(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => LlmError::Auth(format!("anthropic: {}", message)),
        429 => LlmError::RateLimit(format!("anthropic: {}", message)),
        _ => LlmError::Api {
            provider: "anthropic".to_string(),
            status,
            message,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Assembly
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates Messages API stream events into a full [`ChatResponse`].
struct SseAssembler {
    model: String,
    text: String,
    // Open tool_use blocks keyed by content block index: (id, name, json buffer)
    open_tools: BTreeMap<usize, (String, String, String)>,
    tool_calls: Vec<Value>,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

impl SseAssembler {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            text: String::new(),
            open_tools: BTreeMap::new(),
            tool_calls: Vec::new(),
            input_tokens: None,
            output_tokens: None,
        }
    }

    /// Process one `data:` payload. Returns true on `message_stop`.
    fn push_event(&mut self, data: &str, on_chunk: &ChunkHandler) -> Result<bool> {
        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(adapter = "anthropic", "Skipping unparsable stream event");
                return Ok(false);
            }
        };

        match event.get("type").and_then(|t| t.as_str()) {
            Some("message_start") => {
                if let Some(message) = event.get("message") {
                    if let Some(model) = message.get("model").and_then(|m| m.as_str()) {
                        self.model = model.to_string();
                    }
                    if let Some(usage) = message.get("usage") {
                        self.input_tokens = usage
                            .get("input_tokens")
                            .and_then(|v| v.as_u64())
                            .map(|v| v as u32);
                    }
                }
            }
            Some("content_block_start") => {
                let index = event.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                if let Some(block) = event.get("content_block") {
                    if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                        let id = block
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        let name = block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        self.open_tools.insert(index, (id, name, String::new()));
                    }
                }
            }
            Some("content_block_delta") => {
                let index = event.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                if let Some(delta) = event.get("delta") {
                    match delta.get("type").and_then(|t| t.as_str()) {
                        Some("text_delta") => {
                            if let Some(piece) = delta.get("text").and_then(|t| t.as_str()) {
                                self.text.push_str(piece);
                                on_chunk(piece);
                            }
                        }
                        Some("input_json_delta") => {
                            if let Some(fragment) =
                                delta.get("partial_json").and_then(|t| t.as_str())
                            {
                                if let Some(tool) = self.open_tools.get_mut(&index) {
                                    tool.2.push_str(fragment);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some("content_block_stop") => {
                let index = event.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                if let Some((id, name, buffer)) = self.open_tools.remove(&index) {
                    let input: Value = if buffer.is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&buffer).map_err(|e| {
                            LlmError::MalformedToolCall(format!(
                                "streamed tool input is not valid JSON: {}",
                                e
                            ))
                        })?
                    };
                    self.tool_calls.push(json!({
                        "type": "tool_use",
                        "id": id,
                        "name": name,
                        "input": input,
                    }));
                }
            }
            Some("message_delta") => {
                if let Some(usage) = event.get("usage") {
                    self.output_tokens = usage
                        .get("output_tokens")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as u32);
                }
            }
            Some("message_stop") => return Ok(true),
            _ => {}
        }

        Ok(false)
    }

    fn finish(self) -> ChatResponse {
        let total = match (self.input_tokens, self.output_tokens) {
            (Some(i), Some(o)) => Some(i + o),
            _ => None,
        };
        ChatResponse {
            model: self.model,
            content: if self.text.is_empty() {
                None
            } else {
                Some(self.text)
            },
            tool_calls: self.tool_calls,
            usage: Usage::new(self.input_tokens, self.output_tokens, total),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

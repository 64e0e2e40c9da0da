//! Google Gemini (generateContent) adapter.
//!
//! Gemini differs from the OpenAI family in most places the adapter
//! interface abstracts over: instructions travel as a top-level
//! `system_instruction`, the assistant role is labeled `model`, tool
//! schemas ride in `function_declarations`, and tool calls carry no
//! correlation id.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Value, json};
use std::time::Duration;

use crate::adapter::{ProviderAdapter, decode_arguments, split_function_name};
use crate::error::{LlmError, Result};
use crate::message::{Message, Role, ToolCallRequest};
use crate::request::{ChatRequest, ToolChoice};
use crate::response::{ChatResponse, Usage};
use crate::retry::with_retry;

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model.
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Gemini adapter.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
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

impl GeminiConfig {
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

    /// Create config from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            LlmError::Config("GEMINI_API_KEY environment variable not set".to_string())
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
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Adapter for the Gemini generateContent API.
pub struct GeminiAdapter {
    client: Client,
    config: GeminiConfig,
}

impl GeminiAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create an adapter from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    fn to_wire_content(message: &Message) -> Value {
        match message.role {
            Role::Tool => {
                // No call ids on this API: the correlation key is the
                // function name the model asked for.
                let name = message.tool_call_id.as_deref().unwrap_or_default();
                json!({
                    "role": "function",
                    "parts": [{
                        "functionResponse": {
                            "name": name,
                            "response": {"name": name, "content": message.text()},
                        }
                    }],
                })
            }
            Role::Assistant => {
                let mut parts = Vec::new();
                if let Some(text) = message.content.as_deref() {
                    if !text.is_empty() {
                        parts.push(json!({"text": text}));
                    }
                }
                // tool_calls are native functionCall parts from a prior response
                parts.extend(message.tool_calls.iter().cloned());
                json!({"role": "model", "parts": parts})
            }
            _ => {
                let mut parts = vec![json!({"text": message.text()})];
                if let Some(ref image_url) = message.image_url {
                    parts.push(json!({"file_data": {"file_uri": image_url}}));
                }
                json!({"role": "user", "parts": parts})
            }
        }
    }

    fn translate_tool_choice(&self, choice: &ToolChoice) -> Value {
        let config = match choice {
            ToolChoice::Auto => json!({"mode": "AUTO"}),
            ToolChoice::None => json!({"mode": "NONE"}),
            ToolChoice::Any => json!({"mode": "ANY"}),
            ToolChoice::Tool { name } => json!({
                "mode": "ANY",
                "allowed_function_names": [name],
            }),
        };
        json!({"function_calling_config": config})
    }

    async fn post_chat(&self, model: &str, payload: &Value) -> Result<ChatResponse> {
        let response = self
            .client
            .post(self.generate_url(model))
            .header("x-goog-api-key", &self.config.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &body));
        }

        parse_response(model, &body)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_system_message(&self) -> bool {
        false
    }

    fn allowed_tool_choices(&self) -> &[&str] {
        &["auto", "none", "any", "tool"]
    }

    fn allowed_roles(&self) -> &[&str] {
        &["user", "model", "function"]
    }

    fn build_chat_params(&self, request: &ChatRequest) -> Result<Value> {
        let contents: Vec<Value> = request.messages.iter().map(Self::to_wire_content).collect();

        let mut payload = json!({"contents": contents});
        let body = payload
            .as_object_mut()
            .expect("payload is constructed as an object");

        if let Some(ref instructions) = request.instructions {
            body.insert(
                "system_instruction".to_string(),
                json!({"parts": [{"text": instructions}]}),
            );
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body.insert(
                "tools".to_string(),
                json!([{"function_declarations": declarations}]),
            );
        }
        if let Some(ref choice) = request.tool_choice {
            body.insert("tool_config".to_string(), self.translate_tool_choice(choice));
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            body.insert("generationConfig".to_string(), Value::Object(generation_config));
        }

        Ok(payload)
    }

    /// Decode a `functionCall` part.
    ///
    /// Gemini carries no call id, so the function name doubles as the
    /// correlation id. If one turn requests the same function twice the
    /// correlation of results to requests is ambiguous; results are matched
    /// first-come-first-served.
    fn extract_tool_call(&self, raw: &Value) -> Result<ToolCallRequest> {
        let call = raw.get("functionCall").ok_or_else(|| {
            LlmError::MalformedToolCall("missing functionCall part".to_string())
        })?;
        let name = call
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::MalformedToolCall("missing function name".to_string()))?;

        let (tool_name, method_name) = split_function_name(name)?;
        let arguments = decode_arguments(call.get("args").unwrap_or(&Value::Null))?;

        Ok(ToolCallRequest {
            id: name.to_string(),
            tool_name,
            method_name,
            arguments,
        })
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let payload = self.build_chat_params(request)?;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());

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
            || async { self.post_chat(&model, &payload).await },
        )
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Parsing
// ─────────────────────────────────────────────────────────────────────────────

fn parse_response(model: &str, body: &str) -> Result<ChatResponse> {
    let parsed: Value =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    let parts = parsed
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| LlmError::MalformedResponse("response carried no candidates".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(piece) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(piece);
        }
        if part.get("functionCall").is_some() {
            tool_calls.push(part.clone());
        }
    }

    let usage = parsed
        .get("usageMetadata")
        .map(|usage| {
            Usage::new(
                usage
                    .get("promptTokenCount")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32),
                usage
                    .get("candidatesTokenCount")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32),
                usage
                    .get("totalTokenCount")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32),
            )
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        model: model.to_string(),
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls,
        usage,
    })
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
        401 | 403 => LlmError::Auth(format!("gemini: {}", message)),
        429 => LlmError::RateLimit(format!("gemini: {}", message)),
        _ => LlmError::Api {
            provider: "gemini".to_string(),
            status,
            message,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

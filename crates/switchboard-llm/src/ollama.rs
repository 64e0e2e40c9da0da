//! Ollama (local) adapter, via its OpenAI-compatible endpoint.
//!
//! Ollama accepts tool definitions but no `tool_choice` control — the only
//! supported choice is `auto`, and anything else fails fast before a
//! request is sent.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Value, json};
use std::time::Duration;

use crate::adapter::ProviderAdapter;
use crate::error::{LlmError, Result};
use crate::message::ToolCallRequest;
use crate::request::{ChatRequest, ToolChoice};
use crate::response::ChatResponse;
use crate::retry::with_retry;
use crate::wire;

/// Default local endpoint.
const DEFAULT_API_BASE: &str = "http://localhost:11434/v1";

/// Default model.
const DEFAULT_MODEL: &str = "llama3.1";

/// Local inference can be slow; default to a longer timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Ollama adapter.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
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

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl OllamaConfig {
    /// Create a config with default local settings.
    pub fn new() -> Self {
        Self::default()
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
// Ollama Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Adapter for a local Ollama server.
pub struct OllamaAdapter {
    client: Client,
    config: OllamaConfig,
}

impl OllamaAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create an adapter with default local settings.
    pub fn local() -> Result<Self> {
        Self::new(OllamaConfig::default())
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn post_chat(&self, payload: &Value) -> Result<ChatResponse> {
        let response = self
            .client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
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
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supports_system_message(&self) -> bool {
        true
    }

    fn allowed_tool_choices(&self) -> &[&str] {
        &["auto"]
    }

    fn allowed_roles(&self) -> &[&str] {
        &["system", "user", "assistant", "tool"]
    }

    fn build_chat_params(&self, request: &ChatRequest) -> Result<Value> {
        if let Some(ref choice) = request.tool_choice {
            if !matches!(choice, ToolChoice::Auto) {
                return Err(LlmError::UnsupportedToolChoice {
                    choice: choice.to_string(),
                    provider: self.name().to_string(),
                });
            }
        }

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
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn adapter() -> OllamaAdapter {
        OllamaAdapter::local().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, DEFAULT_API_BASE);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_only_auto_tool_choice() {
        let adapter = adapter();
        assert_eq!(adapter.allowed_tool_choices(), &["auto"]);

        let request = ChatRequest::new(vec![Message::user("hi")])
            .with_tool_choice(ToolChoice::Auto);
        assert!(adapter.build_chat_params(&request).is_ok());

        let request =
            ChatRequest::new(vec![Message::user("hi")]).with_tool_choice(ToolChoice::Any);
        let err = adapter.build_chat_params(&request).unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedToolChoice { .. }));
    }

    #[test]
    fn test_extract_tool_call() {
        let raw = serde_json::json!({
            "id": "call_o1",
            "function": {"name": "calculator__execute", "arguments": "{\"input\": \"5*5\"}"}
        });
        let decoded = adapter().extract_tool_call(&raw).unwrap();
        assert_eq!(decoded.id, "call_o1");
        assert_eq!(decoded.tool_name, "calculator");
        assert_eq!(decoded.method_name, "execute");
    }

    #[test]
    fn test_build_chat_params_no_parallel_field() {
        let request = ChatRequest::new(vec![Message::user("hi")]).with_tools(vec![
            crate::request::ToolFunction::new(
                "calculator__execute",
                "Evaluate",
                serde_json::json!({"type": "object"}),
            ),
        ]);

        let payload = adapter().build_chat_params(&request).unwrap();
        assert!(payload.get("parallel_tool_calls").is_none());
        assert_eq!(payload["model"], DEFAULT_MODEL);
    }
}

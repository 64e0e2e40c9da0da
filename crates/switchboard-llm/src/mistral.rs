//! Mistral chat completions adapter.
//!
//! Mistral speaks an OpenAI-compatible dialect; the differences live in the
//! tool_choice spelling (`"any"` instead of `"required"`) and the auth
//! endpoint.

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

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.mistral.ai/v1";

/// Default model.
const DEFAULT_MODEL: &str = "mistral-large-latest";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Mistral adapter.
#[derive(Debug, Clone)]
pub struct MistralConfig {
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

impl MistralConfig {
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

    /// Create config from the `MISTRAL_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MISTRAL_API_KEY").map_err(|_| {
            LlmError::Config("MISTRAL_API_KEY environment variable not set".to_string())
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
// Mistral Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Adapter for the Mistral chat completions API.
pub struct MistralAdapter {
    client: Client,
    config: MistralConfig,
}

impl MistralAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: MistralConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create an adapter from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(MistralConfig::from_env()?)
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn translate_tool_choice(&self, choice: &ToolChoice) -> Value {
        match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Any => json!("any"),
            ToolChoice::Tool { name } => json!({
                "type": "function",
                "function": {"name": name},
            }),
        }
    }

    async fn post_chat(&self, payload: &Value) -> Result<ChatResponse> {
        let response = self
            .client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
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
impl ProviderAdapter for MistralAdapter {
    fn name(&self) -> &str {
        "mistral"
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
            body.insert("tool_choice".to_string(), self.translate_tool_choice(choice));
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
    use crate::request::ToolFunction;

    fn adapter() -> MistralAdapter {
        MistralAdapter::new(MistralConfig::new("test-key")).unwrap()
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            adapter().completions_url(),
            "https://api.mistral.ai/v1/chat/completions"
        );
    }

    #[test]
    fn test_any_stays_any() {
        // Unlike OpenAI, Mistral spells forced tool use "any"
        assert_eq!(
            adapter().translate_tool_choice(&ToolChoice::Any),
            json!("any")
        );
    }

    #[test]
    fn test_build_chat_params() {
        let request = ChatRequest::new(vec![Message::user("Bonjour")])
            .with_instructions("Réponds en français.")
            .with_tools(vec![ToolFunction::new(
                "calculator__execute",
                "Evaluate",
                json!({"type": "object"}),
            )])
            .with_tool_choice(ToolChoice::Auto);

        let payload = adapter().build_chat_params(&request).unwrap();
        assert_eq!(payload["model"], DEFAULT_MODEL);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["tool_choice"], "auto");
        assert_eq!(payload["parallel_tool_calls"], true);
    }

    #[test]
    fn test_extract_tool_call() {
        let raw = json!({
            "id": "call_m1",
            "function": {"name": "calculator__execute", "arguments": "{\"input\": \"1+1\"}"}
        });
        let decoded = adapter().extract_tool_call(&raw).unwrap();
        assert_eq!(decoded.id, "call_m1");
        assert_eq!(decoded.tool_name, "calculator");
    }
}

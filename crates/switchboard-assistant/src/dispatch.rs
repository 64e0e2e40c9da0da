//! Tool dispatch: decoding, resolving, and executing the tool calls an
//! assistant message carries.
//!
//! Calls are executed strictly sequentially and in request order, even when
//! the vendor marks them parallel, so side effects stay deterministic.

use serde_json::{Map, Value};
use std::sync::Arc;

use switchboard_llm::{Message, ProviderAdapter};

use crate::error::{AssistantError, Result};
use crate::tool::ToolRegistry;

/// Observability hook fired before each tool execution with
/// `(call_id, tool_name, method_name, arguments)`. Must not affect control
/// flow.
pub type ToolExecutionCallback = Arc<dyn Fn(&str, &str, &str, &Map<String, Value>) + Send + Sync>;

/// Executes tool calls against a registry, using the active provider
/// adapter to decode vendor-native payloads.
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
    adapter: &'a dyn ProviderAdapter,
    on_execution: Option<ToolExecutionCallback>,
}

impl<'a> ToolDispatcher<'a> {
    /// Create a dispatcher over the given registry and adapter.
    pub fn new(registry: &'a ToolRegistry, adapter: &'a dyn ProviderAdapter) -> Self {
        Self {
            registry,
            adapter,
            on_execution: None,
        }
    }

    /// Attach the pre-execution observability callback.
    pub fn with_callback(mut self, callback: ToolExecutionCallback) -> Self {
        self.on_execution = Some(callback);
        self
    }

    /// Execute one vendor-native tool call and wrap its result as a
    /// tool message correlated by the call id.
    ///
    /// Decode failures and unknown tools are fatal to the dispatch and
    /// propagate; the run loop's guard turns them into the failed state.
    pub async fn dispatch_call(&self, raw: &Value) -> Result<Message> {
        let request = self.adapter.extract_tool_call(raw)?;

        let binding = self
            .registry
            .resolve(&request.tool_name, &request.method_name)
            .ok_or_else(|| AssistantError::ToolNotFound(request.function_name()))?;

        if let Some(ref callback) = self.on_execution {
            callback(
                &request.id,
                &request.tool_name,
                &request.method_name,
                &request.arguments,
            );
        }

        tracing::debug!(
            tool = %request.tool_name,
            method = %request.method_name,
            call_id = %request.id,
            "Executing tool"
        );

        let output = binding
            .tool
            .call(&request.method_name, &request.arguments)
            .await
            .map_err(|e| {
                AssistantError::ToolExecution(format!("{}: {}", request.function_name(), e))
            })?;

        tracing::debug!(
            tool = %request.tool_name,
            method = %request.method_name,
            call_id = %request.id,
            output_bytes = output.content.as_deref().map(str::len).unwrap_or(0),
            "Tool completed"
        );

        let mut message = Message::tool(output.content.unwrap_or_default(), request.id);
        if let Some(image_url) = output.image_url {
            message = message.with_image_url(image_url);
        }
        Ok(message)
    }

    /// Execute a batch of tool calls in order, stopping at the first
    /// failure.
    pub async fn dispatch(&self, raw_calls: &[Value]) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(raw_calls.len());
        for raw in raw_calls {
            messages.push(self.dispatch_call(raw).await?);
        }
        Ok(messages)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{MockTool, ToolOutput};
    use serde_json::json;
    use switchboard_llm::{MockAdapter, Role};

    fn registry_with(tool: MockTool) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_dispatch_call_wraps_tool_message() {
        let registry = registry_with(MockTool::new("calculator").with_output(ToolOutput::text("4.0")));
        let adapter = MockAdapter::new(vec![]);
        let dispatcher = ToolDispatcher::new(&registry, &adapter);

        let raw = MockAdapter::tool_call_payload(
            "call_1",
            "calculator__execute",
            json!({"input": "2+2"}),
        );
        let message = dispatcher.dispatch_call(&raw).await.unwrap();

        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.text(), "4.0");
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_dispatch_preserves_request_order() {
        let registry = registry_with(MockTool::new("echo"));
        let adapter = MockAdapter::new(vec![]);
        let dispatcher = ToolDispatcher::new(&registry, &adapter);

        let calls = vec![
            MockAdapter::tool_call_payload("call_a", "echo__execute", json!({"input": "a"})),
            MockAdapter::tool_call_payload("call_b", "echo__execute", json!({"input": "b"})),
        ];
        let messages = dispatcher.dispatch(&calls).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("call_b"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let registry = ToolRegistry::new();
        let adapter = MockAdapter::new(vec![]);
        let dispatcher = ToolDispatcher::new(&registry, &adapter);

        let raw = MockAdapter::tool_call_payload("call_1", "mystery__execute", json!({}));
        let err = dispatcher.dispatch_call(&raw).await.unwrap_err();
        assert!(matches!(err, AssistantError::ToolNotFound(_)));
        assert!(err.to_string().contains("mystery__execute"));
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal() {
        let registry = registry_with(MockTool::new("calculator"));
        let adapter = MockAdapter::new(vec![]);
        let dispatcher = ToolDispatcher::new(&registry, &adapter);

        // Arguments that are not valid JSON
        let raw = json!({
            "id": "call_1",
            "function": {"name": "calculator__execute", "arguments": "{broken"}
        });
        let err = dispatcher.dispatch_call(&raw).await.unwrap_err();
        assert!(matches!(err, AssistantError::Llm(_)));
    }

    #[tokio::test]
    async fn test_tool_error_propagates_to_guard() {
        let registry = registry_with(MockTool::new("flaky").with_error("exploded"));
        let adapter = MockAdapter::new(vec![]);
        let dispatcher = ToolDispatcher::new(&registry, &adapter);

        let raw = MockAdapter::tool_call_payload("call_1", "flaky__execute", json!({}));
        let err = dispatcher.dispatch_call(&raw).await.unwrap_err();
        assert!(matches!(err, AssistantError::ToolExecution(_)));
        assert!(err.to_string().contains("exploded"));
    }

    #[tokio::test]
    async fn test_execution_callback_fires_before_execution() {
        let registry = registry_with(MockTool::new("calculator"));
        let adapter = MockAdapter::new(vec![]);

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ToolExecutionCallback =
            Arc::new(move |id, tool, method, arguments| {
                sink.lock().unwrap().push((
                    id.to_string(),
                    tool.to_string(),
                    method.to_string(),
                    arguments.clone(),
                ));
            });

        let dispatcher = ToolDispatcher::new(&registry, &adapter).with_callback(callback);
        let raw = MockAdapter::tool_call_payload(
            "call_1",
            "calculator__execute",
            json!({"input": "2+2"}),
        );
        dispatcher.dispatch_call(&raw).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "call_1");
        assert_eq!(seen[0].1, "calculator");
        assert_eq!(seen[0].2, "execute");
        assert_eq!(seen[0].3.get("input"), Some(&json!("2+2")));
    }

    #[tokio::test]
    async fn test_output_image_url_lands_on_message() {
        let registry = registry_with(MockTool::new("artist").with_output(
            ToolOutput::text("rendered").with_image_url("https://example.com/out.png"),
        ));
        let adapter = MockAdapter::new(vec![]);
        let dispatcher = ToolDispatcher::new(&registry, &adapter);

        let raw = MockAdapter::tool_call_payload("call_1", "artist__execute", json!({}));
        let message = dispatcher.dispatch_call(&raw).await.unwrap();
        assert_eq!(
            message.image_url.as_deref(),
            Some("https://example.com/out.png")
        );
    }
}

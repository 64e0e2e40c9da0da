//! Tool trait and registry.
//!
//! Tools expose schema-described actions the model can invoke. The registry
//! builds an explicit dispatch table at registration time — a mapping from
//! advertised function name to `(tool, method)` binding — so dispatch is a
//! table lookup, never runtime reflection, and every declared action is
//! bound to exactly one callable when the tool is registered.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use switchboard_llm::ToolFunction;

use crate::error::{AssistantError, Result};
use crate::schema::ToolSchema;

// ─────────────────────────────────────────────────────────────────────────────
// Tool Output
// ─────────────────────────────────────────────────────────────────────────────

/// The result a tool hands back to the run loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Text content for the tool-result message.
    pub content: Option<String>,
    /// Optional image attachment.
    pub image_url: Option<String>,
}

impl ToolOutput {
    /// Create a text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            image_url: None,
        }
    }

    /// Attach an image URL.
    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

impl From<String> for ToolOutput {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

impl From<&str> for ToolOutput {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error raised by a tool implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// The method is not one of the tool's actions.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// The arguments do not match the action's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The action itself failed.
    #[error("{0}")]
    Execution(String),
}

/// Result type for tool execution.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A capability provider exposing schema-described actions.
///
/// The schema is the contract: the registry advertises exactly the actions
/// it declares, and `call` receives only method names drawn from it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's declarative schema.
    fn schema(&self) -> &ToolSchema;

    /// Invoke one of the schema's actions with decoded keyword arguments.
    async fn call(&self, method: &str, arguments: &Map<String, Value>) -> ToolResult<ToolOutput>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// One entry in the dispatch table.
#[derive(Clone)]
pub struct ActionBinding {
    /// The tool instance to invoke.
    pub tool: Arc<dyn Tool>,
    /// The registry tool name.
    pub tool_name: String,
    /// The method on the tool.
    pub method_name: String,
}

/// Registry of tools with a function-name dispatch table.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    table: HashMap<String, ActionBinding>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, populating the dispatch table from its schema.
    ///
    /// Rejects duplicate tool names and advertised function names.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a tool from an `Arc`.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let schema = tool.schema().clone();
        let tool_name = schema.tool_name().to_string();

        if self
            .tools
            .iter()
            .any(|t| t.schema().tool_name() == tool_name)
        {
            return Err(AssistantError::Registration(format!(
                "tool '{}' is already registered",
                tool_name
            )));
        }

        for action in schema.actions() {
            let function_name = format!("{}__{}", tool_name, action.method_name());
            if self.table.contains_key(&function_name) {
                return Err(AssistantError::Registration(format!(
                    "function '{}' is already registered",
                    function_name
                )));
            }
            self.table.insert(
                function_name,
                ActionBinding {
                    tool: tool.clone(),
                    tool_name: tool_name.clone(),
                    method_name: action.method_name().to_string(),
                },
            );
        }

        self.tools.push(tool);
        Ok(())
    }

    /// Look up the binding for a `(tool, method)` pair.
    pub fn resolve(&self, tool_name: &str, method_name: &str) -> Option<&ActionBinding> {
        self.table
            .get(&format!("{}__{}", tool_name, method_name))
    }

    /// Whether an advertised function name is registered.
    pub fn has_function(&self, function_name: &str) -> bool {
        self.table.contains_key(function_name)
    }

    /// Advertised functions, in registration order.
    pub fn functions(&self) -> Vec<ToolFunction> {
        self.tools
            .iter()
            .flat_map(|tool| tool.schema().functions())
            .collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.schema().tool_name()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Tool (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A mock tool for testing.
///
/// Declares a single `execute` action, returns a configurable output or
/// error, and records the calls it receives.
#[cfg(test)]
pub struct MockTool {
    schema: ToolSchema,
    response: std::sync::Mutex<ToolResult<ToolOutput>>,
    calls: std::sync::Mutex<Vec<(String, Map<String, Value>)>>,
}

#[cfg(test)]
impl MockTool {
    /// Create a mock tool with the given registry name.
    pub fn new(name: &str) -> Self {
        let schema = ToolSchema::builder(name)
            .action("execute", "Execute the mock action", |params| {
                params
                    .property("input", crate::schema::ParamKind::String)
                    .describe("Input value");
            })
            .expect("mock schema action is valid")
            .build()
            .expect("mock schema is valid");

        Self {
            schema,
            response: std::sync::Mutex::new(Ok(ToolOutput::text("mock response"))),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Set the output to return.
    pub fn with_output(self, output: ToolOutput) -> Self {
        *self.response.lock().unwrap() = Ok(output);
        self
    }

    /// Make every call fail with the given execution error.
    pub fn with_error(self, message: &str) -> Self {
        *self.response.lock().unwrap() = Err(ToolError::Execution(message.to_string()));
        self
    }

    /// The calls made so far, as `(method, arguments)` pairs.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Tool for MockTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, method: &str, arguments: &Map<String, Value>) -> ToolResult<ToolOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), arguments.clone()));
        if !self.schema.has_method(method) {
            return Err(ToolError::UnknownMethod(method.to_string()));
        }
        self.response.lock().unwrap().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

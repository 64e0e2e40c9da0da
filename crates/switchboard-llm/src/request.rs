//! Chat request types: the provider-agnostic call parameters the run loop
//! hands to an adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

// ─────────────────────────────────────────────────────────────────────────────
// Tool Choice
// ─────────────────────────────────────────────────────────────────────────────

/// How the model should choose which tool to use.
///
/// Adapters translate these generic values into whatever the vendor expects
/// (string, nested object), erroring on values outside their
/// `allowed_tool_choices` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to use tools.
    Auto,
    /// Model should not use tools.
    None,
    /// Model must use some tool.
    Any,
    /// Model must use a specific advertised function.
    Tool {
        /// The advertised function name (`tool__method`).
        name: String,
    },
}

impl ToolChoice {
    /// Parse the caller-facing string forms: `"auto"`, `"none"`, `"any"`,
    /// or a specific function name.
    pub fn parse(value: &str) -> ToolChoice {
        match value {
            "auto" => ToolChoice::Auto,
            "none" => ToolChoice::None,
            "any" => ToolChoice::Any,
            name => ToolChoice::Tool {
                name: name.to_string(),
            },
        }
    }

    /// The generic label used for validation against an adapter's allowed
    /// set (`"tool"` for the specific-function variant).
    pub fn generic_label(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
            ToolChoice::Any => "any",
            ToolChoice::Tool { .. } => "tool",
        }
    }
}

impl std::fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolChoice::Tool { name } => f.write_str(name),
            other => f.write_str(other.generic_label()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Function
// ─────────────────────────────────────────────────────────────────────────────

/// A tool action advertised to the model.
///
/// The name follows the `"{tool_name}__{method_name}"` convention; adapters
/// wrap the definition in the vendor's required envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    /// Advertised function name (`tool__method`).
    pub name: String,
    /// Description of what the action does.
    pub description: String,
    /// JSON Schema for the action's parameters.
    pub parameters: Value,
}

impl ToolFunction {
    /// Create a new tool function definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Request
// ─────────────────────────────────────────────────────────────────────────────

/// A provider-agnostic chat request.
///
/// Instructions are a logical system message regardless of how the vendor
/// wants them delivered (in-band message or top-level field); the adapter
/// hides that difference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// System instructions, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// The conversation messages, in order.
    pub messages: Vec<Message>,

    /// Tool functions available for the model to call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolFunction>,

    /// How the model should use tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Whether the model may request several tool calls in one turn.
    pub parallel_tool_calls: bool,

    /// Model override for this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a request for the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            instructions: None,
            messages,
            tools: Vec::new(),
            tool_choice: None,
            parallel_tool_calls: true,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the system instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Attach tool functions.
    pub fn with_tools(mut self, tools: Vec<ToolFunction>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the tool choice.
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Allow or forbid parallel tool calls.
    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Override the model for this request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the generation token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_choice_parse() {
        assert_eq!(ToolChoice::parse("auto"), ToolChoice::Auto);
        assert_eq!(ToolChoice::parse("none"), ToolChoice::None);
        assert_eq!(ToolChoice::parse("any"), ToolChoice::Any);
        assert_eq!(
            ToolChoice::parse("calculator__execute"),
            ToolChoice::Tool {
                name: "calculator__execute".to_string()
            }
        );
    }

    #[test]
    fn test_tool_choice_labels() {
        assert_eq!(ToolChoice::Auto.generic_label(), "auto");
        assert_eq!(
            ToolChoice::Tool {
                name: "a__b".to_string()
            }
            .generic_label(),
            "tool"
        );
        assert_eq!(
            ToolChoice::Tool {
                name: "a__b".to_string()
            }
            .to_string(),
            "a__b"
        );
    }

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::new(vec![Message::user("Hello")])
            .with_instructions("You are helpful.")
            .with_tool_choice(ToolChoice::Auto)
            .with_temperature(0.2)
            .with_parallel_tool_calls(false);

        assert_eq!(request.instructions.as_deref(), Some("You are helpful."));
        assert_eq!(request.tool_choice, Some(ToolChoice::Auto));
        assert_eq!(request.temperature, Some(0.2));
        assert!(!request.parallel_tool_calls);
    }
}

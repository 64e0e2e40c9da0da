//! The assistant: a run loop driving a thread through provider calls and
//! tool dispatch to a terminal state.
//!
//! The loop is an explicit state machine over [`RunState`]. Each `run`
//! invocation evaluates states until one is terminal for that run:
//! `completed`, `failed`, or — when auto tool execution is off —
//! `requires_action`, where control returns to the caller for manual tool
//! handling via [`Assistant::submit_tool_output`].
//!
//! Failure handling is deliberately asymmetric: provider errors propagate
//! to the caller untouched, while tool-execution errors are caught, logged,
//! and downgrade the run to `failed` so a misbehaving tool cannot crash the
//! host loop.

use serde_json::Value;
use std::sync::Arc;

use switchboard_llm::{
    ChatRequest, ChatResponse, Message, ProviderAdapter, Role, SharedAdapter, ToolChoice,
};

use crate::dispatch::{ToolDispatcher, ToolExecutionCallback};
use crate::error::{AssistantError, Result};
use crate::thread::Thread;
use crate::tool::{Tool, ToolRegistry};
use crate::types::{MessageCallback, RunState, UsageCounters};

// ─────────────────────────────────────────────────────────────────────────────
// Assistant
// ─────────────────────────────────────────────────────────────────────────────

/// Drives a conversation thread through LLM calls and tool executions.
pub struct Assistant {
    adapter: SharedAdapter,
    thread: Thread,
    tools: ToolRegistry,
    tool_choice: ToolChoice,
    parallel_tool_calls: bool,
    state: RunState,
    usage: UsageCounters,
    max_iterations: Option<usize>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    on_message: Option<MessageCallback>,
    on_tool_execution: Option<ToolExecutionCallback>,
}

impl Assistant {
    /// Create an assistant builder.
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::new()
    }

    // ── Message management ───────────────────────────────────────────

    /// Append a message built from a vendor role label.
    ///
    /// Role legality is enforced by the active adapter. Appending resets a
    /// finished run back to `ready`.
    pub fn add_message(
        &mut self,
        role: &str,
        content: Option<String>,
        image_url: Option<String>,
        tool_calls: Vec<Value>,
        tool_call_id: Option<String>,
    ) -> Result<()> {
        let message = self
            .adapter
            .build_message(role, content, image_url, tool_calls, tool_call_id)?;
        self.append_message(message)?;
        self.state = RunState::Ready;
        Ok(())
    }

    /// Append a plain user message.
    pub fn add_user_message(&mut self, content: impl Into<String>) -> Result<()> {
        self.add_message("user", Some(content.into()), None, vec![], None)
    }

    /// Append a user message with an image attachment.
    pub fn add_user_message_with_image(
        &mut self,
        content: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Result<()> {
        self.add_message(
            "user",
            Some(content.into()),
            Some(image_url.into()),
            vec![],
            None,
        )
    }

    /// Submit the output of a manually-executed tool call.
    ///
    /// The manual counterpart of auto tool execution: when a run halts in
    /// `requires_action`, the caller executes tools out-of-band and feeds
    /// each result back here, then calls [`Assistant::run`] again.
    pub fn submit_tool_output(
        &mut self,
        tool_call_id: impl Into<String>,
        output: impl Into<String>,
    ) -> Result<()> {
        let message = Message::tool(output, tool_call_id);
        self.append_message(message)?;
        self.state = RunState::Ready;
        Ok(())
    }

    /// Replace the system instructions.
    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.thread.set_instructions(instructions);
    }

    /// Remove the system instructions.
    pub fn clear_instructions(&mut self) {
        self.thread.clear_instructions();
    }

    /// Remove every message from the thread.
    pub fn clear_messages(&mut self) {
        self.thread.clear();
        self.state = RunState::Ready;
    }

    /// Set the tool choice from its string form
    /// (`"auto"`, `"none"`, `"any"`, or a registered function name).
    ///
    /// Values outside the adapter's allowed set, and function names that
    /// are not registered, are rejected; the prior value is kept.
    pub fn set_tool_choice(&mut self, value: &str) -> Result<()> {
        let choice = ToolChoice::parse(value);

        if !self
            .adapter
            .allowed_tool_choices()
            .contains(&choice.generic_label())
        {
            return Err(AssistantError::InvalidToolChoice {
                choice: value.to_string(),
            });
        }
        if let ToolChoice::Tool { ref name } = choice {
            if !self.tools.has_function(name) {
                return Err(AssistantError::InvalidToolChoice {
                    choice: value.to_string(),
                });
            }
        }

        self.tool_choice = choice;
        Ok(())
    }

    // ── Run loop ─────────────────────────────────────────────────────

    /// Drive the state machine until a terminal condition, executing tools
    /// along the way when `auto_tool_execution` is on.
    ///
    /// Returns a snapshot of the thread. Provider errors propagate;
    /// tool-execution errors fail the run state instead.
    pub async fn run(&mut self, auto_tool_execution: bool) -> Result<Vec<Message>> {
        if self.thread.is_empty() {
            tracing::warn!("run invoked on an empty thread; nothing to send");
            self.state = RunState::Completed;
            return Ok(self.thread.messages().to_vec());
        }

        self.state = RunState::InProgress;
        let mut iterations = 0usize;

        while !self.run_finished(auto_tool_execution) {
            iterations += 1;
            if let Some(max) = self.max_iterations {
                if iterations > max {
                    tracing::warn!(iterations, max, "Iteration ceiling exceeded; failing run");
                    self.state = RunState::Failed;
                    break;
                }
            }
            self.handle_state(auto_tool_execution).await?;
        }

        tracing::debug!(state = %self.state, messages = self.thread.len(), "Run finished");
        Ok(self.thread.messages().to_vec())
    }

    /// Run with auto tool execution.
    pub async fn run_auto(&mut self) -> Result<Vec<Message>> {
        self.run(true).await
    }

    /// Append a user message and run.
    pub async fn add_message_and_run(
        &mut self,
        content: impl Into<String>,
        auto_tool_execution: bool,
    ) -> Result<Vec<Message>> {
        self.add_user_message(content)?;
        self.run(auto_tool_execution).await
    }

    fn run_finished(&self, auto_tool_execution: bool) -> bool {
        self.state.is_terminal()
            || (self.state == RunState::RequiresAction && !auto_tool_execution)
    }

    async fn handle_state(&mut self, auto_tool_execution: bool) -> Result<()> {
        match self.state {
            RunState::Ready => {
                self.state = RunState::InProgress;
                Ok(())
            }
            RunState::InProgress => self.handle_in_progress().await,
            RunState::RequiresAction => {
                // Manual mode halts before reaching here
                debug_assert!(auto_tool_execution);
                self.execute_tools().await;
                Ok(())
            }
            RunState::Completed | RunState::Failed => Ok(()),
        }
    }

    /// Evaluate the thread's last message and advance.
    async fn handle_in_progress(&mut self) -> Result<()> {
        let (role, has_tool_calls) = match self.thread.last() {
            Some(last) => (last.role, last.has_tool_calls()),
            None => {
                self.state = RunState::Completed;
                return Ok(());
            }
        };

        match role {
            Role::System => {
                // A bare system message cannot be sent on its own
                tracing::debug!("thread ends at the system message; completing run");
                self.state = RunState::Completed;
                Ok(())
            }
            Role::Assistant => {
                self.state = if has_tool_calls {
                    RunState::RequiresAction
                } else {
                    RunState::Completed
                };
                Ok(())
            }
            Role::User | Role::Tool => self.chat_with_provider().await,
        }
    }

    /// Issue one provider call and classify the response.
    async fn chat_with_provider(&mut self) -> Result<()> {
        let request = self.build_chat_request();

        tracing::debug!(
            adapter = self.adapter.name(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling provider"
        );

        // Provider errors are not caught here: fail-fast to the caller
        let response = self.adapter.chat(&request).await?;
        self.usage.record(&response.usage);

        let has_tool_calls = response.has_tool_calls();
        let has_content = response
            .content
            .as_deref()
            .is_some_and(|text| !text.is_empty());

        self.append_message(Self::response_to_message(response))?;

        // Tool calls take precedence over content: some providers return
        // both a partial text and a tool call in the same turn.
        if has_tool_calls {
            // Re-evaluated to requires_action on the next iteration
            self.state = RunState::InProgress;
        } else if has_content {
            self.state = RunState::Completed;
        } else {
            tracing::error!(
                adapter = self.adapter.name(),
                "provider returned neither tool calls nor content"
            );
            self.state = RunState::Failed;
        }
        Ok(())
    }

    /// Execute every pending tool call on the last assistant message.
    ///
    /// Dispatch errors are caught here: logged, and the run state is
    /// downgraded to `failed` without propagating. Messages appended before
    /// the failure stay on the thread.
    async fn execute_tools(&mut self) {
        let tool_calls: Vec<Value> = self
            .thread
            .last()
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        // Cheap clones so the dispatcher does not hold borrows of self
        // while results are appended.
        let registry = self.tools.clone();
        let adapter = self.adapter.clone();
        let mut dispatcher = ToolDispatcher::new(&registry, adapter.as_ref());
        if let Some(ref callback) = self.on_tool_execution {
            dispatcher = dispatcher.with_callback(callback.clone());
        }

        for raw in &tool_calls {
            match dispatcher.dispatch_call(raw).await {
                Ok(message) => {
                    if let Err(e) = self.append_message(message) {
                        tracing::error!(error = %e, "failed to append tool result");
                        self.state = RunState::Failed;
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "tool execution failed");
                    self.state = RunState::Failed;
                    return;
                }
            }
        }

        self.state = RunState::InProgress;
    }

    fn build_chat_request(&self) -> ChatRequest {
        let mut request = ChatRequest::new(self.thread.conversation().to_vec())
            .with_tools(self.tools.functions())
            .with_parallel_tool_calls(self.parallel_tool_calls);

        if let Some(instructions) = self.thread.instructions() {
            request = request.with_instructions(instructions);
        }
        if !self.tools.is_empty() {
            request = request.with_tool_choice(self.tool_choice.clone());
        }
        if let Some(ref model) = self.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    fn response_to_message(response: ChatResponse) -> Message {
        Message {
            role: Role::Assistant,
            content: response.content.filter(|text| !text.is_empty()),
            image_url: None,
            tool_calls: response.tool_calls,
            tool_call_id: None,
        }
    }

    /// The single append path: every message — caller, provider, or tool
    /// dispatcher — lands here, so the message callback fires uniformly.
    fn append_message(&mut self, message: Message) -> Result<()> {
        self.thread.push(message)?;
        if let Some(ref callback) = self.on_message {
            if let Some(last) = self.thread.last() {
                callback(last);
            }
        }
        Ok(())
    }

    // ── Read-only accessors ──────────────────────────────────────────

    /// The thread's messages, system message first when present.
    pub fn messages(&self) -> &[Message] {
        self.thread.messages()
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The system instructions, if set.
    pub fn instructions(&self) -> Option<&str> {
        self.thread.instructions()
    }

    /// Current tool choice.
    pub fn tool_choice(&self) -> &ToolChoice {
        &self.tool_choice
    }

    /// The registered tools.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Accumulated prompt tokens.
    pub fn total_prompt_tokens(&self) -> u64 {
        self.usage.prompt_tokens
    }

    /// Accumulated completion tokens.
    pub fn total_completion_tokens(&self) -> u64 {
        self.usage.completion_tokens
    }

    /// Accumulated total tokens.
    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`Assistant`].
pub struct AssistantBuilder {
    adapter: Option<SharedAdapter>,
    instructions: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    tool_choice: ToolChoice,
    parallel_tool_calls: bool,
    max_iterations: Option<usize>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    on_message: Option<MessageCallback>,
    on_tool_execution: Option<ToolExecutionCallback>,
}

impl AssistantBuilder {
    /// Create a builder with defaults.
    pub fn new() -> Self {
        Self {
            adapter: None,
            instructions: None,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: true,
            max_iterations: None,
            model: None,
            temperature: None,
            max_tokens: None,
            on_message: None,
            on_tool_execution: None,
        }
    }

    /// Set the provider adapter.
    pub fn with_adapter(mut self, adapter: impl ProviderAdapter + 'static) -> Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Set the provider adapter from a shared reference.
    pub fn with_shared_adapter(mut self, adapter: SharedAdapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Set the system instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Set the initial tool choice.
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// Allow or forbid parallel tool calls on requests.
    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Cap the number of run-loop iterations per `run` invocation.
    ///
    /// There is no cap by default; the state machine alone terminates the
    /// loop. The ceiling guards against an adapter or tool that never stops
    /// requesting tools — exceeding it fails the run state rather than
    /// raising.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Override the model on every request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature on every request.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the generation token budget on every request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Fire a callback for every message appended to the thread.
    pub fn on_message(mut self, callback: MessageCallback) -> Self {
        self.on_message = Some(callback);
        self
    }

    /// Fire a callback before every tool execution.
    pub fn on_tool_execution(mut self, callback: ToolExecutionCallback) -> Self {
        self.on_tool_execution = Some(callback);
        self
    }

    /// Build the assistant.
    ///
    /// Fails without an adapter, on tool registration conflicts, and on a
    /// tool choice the adapter or registry cannot satisfy.
    pub fn build(self) -> Result<Assistant> {
        let adapter = self
            .adapter
            .ok_or_else(|| AssistantError::Config("a provider adapter is required".to_string()))?;

        let mut tools = ToolRegistry::new();
        for tool in self.tools {
            tools.register_arc(tool)?;
        }

        if !adapter
            .allowed_tool_choices()
            .contains(&self.tool_choice.generic_label())
        {
            return Err(AssistantError::InvalidToolChoice {
                choice: self.tool_choice.to_string(),
            });
        }
        if let ToolChoice::Tool { ref name } = self.tool_choice {
            if !tools.has_function(name) {
                return Err(AssistantError::InvalidToolChoice {
                    choice: name.clone(),
                });
            }
        }

        let mut thread = Thread::new();
        if let Some(instructions) = self.instructions {
            thread.set_instructions(instructions);
        }

        Ok(Assistant {
            adapter,
            thread,
            tools,
            tool_choice: self.tool_choice,
            parallel_tool_calls: self.parallel_tool_calls,
            state: RunState::Ready,
            usage: UsageCounters::default(),
            max_iterations: self.max_iterations,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            on_message: self.on_message,
            on_tool_execution: self.on_tool_execution,
        })
    }
}

impl Default for AssistantBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

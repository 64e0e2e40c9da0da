//! The conversation thread: an insertion-ordered message sequence with a
//! single pinned system message.

use switchboard_llm::{Message, Role};

use crate::error::{AssistantError, Result};

/// An ordered sequence of messages comprising one conversation.
///
/// Invariants: if a system message exists it sits at index 0, and there is
/// at most one; messages are never reordered or dropped except by
/// [`Thread::clear`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thread {
    messages: Vec<Message>,
}

impl Thread {
    /// Create an empty thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    ///
    /// A system message replaces the existing one at index 0 instead of
    /// appending. Tool calls on a non-assistant message are rejected.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if message.has_tool_calls() && message.role != Role::Assistant {
            return Err(AssistantError::Config(format!(
                "only assistant messages may carry tool calls (got role '{}')",
                message.role
            )));
        }

        if message.is_system() {
            self.replace_system(message);
        } else {
            self.messages.push(message);
        }
        Ok(())
    }

    /// Set or replace the system instructions.
    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.replace_system(Message::system(instructions));
    }

    /// Remove the system message, if any.
    pub fn clear_instructions(&mut self) {
        if self.messages.first().is_some_and(Message::is_system) {
            self.messages.remove(0);
        }
    }

    /// The system instructions, if set.
    pub fn instructions(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.is_system())
            .and_then(|m| m.content.as_deref())
    }

    fn replace_system(&mut self, message: Message) {
        if self.messages.first().is_some_and(Message::is_system) {
            self.messages.remove(0);
        }
        self.messages.insert(0, message);
    }

    /// All messages, system message first when present.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The non-system conversation messages.
    ///
    /// Instructions travel separately on the chat request, so the provider
    /// payload is built from this view.
    pub fn conversation(&self) -> &[Message] {
        if self.messages.first().is_some_and(Message::is_system) {
            &self.messages[1..]
        } else {
            &self.messages
        }
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages, including the system message.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the thread holds no messages at all.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Remove every message, the system message included.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_message_pinned_first() {
        let mut thread = Thread::new();
        thread.push(Message::user("hi")).unwrap();
        thread.push(Message::assistant("hello")).unwrap();
        thread.set_instructions("Be helpful.");

        assert_eq!(thread.len(), 3);
        assert!(thread.messages()[0].is_system());
        assert_eq!(thread.instructions(), Some("Be helpful."));
    }

    #[test]
    fn test_instructions_replace_not_append() {
        let mut thread = Thread::new();
        thread.set_instructions("First.");
        thread.push(Message::user("hi")).unwrap();
        thread.set_instructions("Second.");

        assert_eq!(thread.len(), 2);
        assert_eq!(thread.instructions(), Some("Second."));
        assert!(thread.messages()[0].is_system());
        assert_eq!(thread.messages()[1].role, Role::User);
    }

    #[test]
    fn test_system_push_replaces_too() {
        let mut thread = Thread::new();
        thread.push(Message::system("First.")).unwrap();
        thread.push(Message::system("Second.")).unwrap();

        assert_eq!(thread.len(), 1);
        assert_eq!(thread.instructions(), Some("Second."));
    }

    #[test]
    fn test_system_first_under_interleavings() {
        let mut thread = Thread::new();
        for i in 0..5 {
            thread.push(Message::user(format!("message {}", i))).unwrap();
            thread.set_instructions(format!("instructions {}", i));
        }

        assert!(thread.messages()[0].is_system());
        assert_eq!(
            thread.messages()[1..]
                .iter()
                .filter(|m| m.is_system())
                .count(),
            0
        );
        assert_eq!(thread.instructions(), Some("instructions 4"));
    }

    #[test]
    fn test_conversation_skips_system() {
        let mut thread = Thread::new();
        thread.set_instructions("Be brief.");
        thread.push(Message::user("hi")).unwrap();

        assert_eq!(thread.conversation().len(), 1);
        assert_eq!(thread.conversation()[0].role, Role::User);

        let mut bare = Thread::new();
        bare.push(Message::user("hi")).unwrap();
        assert_eq!(bare.conversation().len(), 1);
    }

    #[test]
    fn test_tool_calls_require_assistant_role() {
        let mut thread = Thread::new();
        let bad = Message::user("no").with_tool_calls(vec![json!({"id": "x"})]);
        assert!(matches!(
            thread.push(bad),
            Err(AssistantError::Config(_))
        ));
        assert!(thread.is_empty());
    }

    #[test]
    fn test_clear_instructions() {
        let mut thread = Thread::new();
        thread.set_instructions("Gone soon.");
        thread.push(Message::user("hi")).unwrap();
        thread.clear_instructions();

        assert_eq!(thread.instructions(), None);
        assert_eq!(thread.len(), 1);
    }

    #[test]
    fn test_clear_then_set_matches_fresh() {
        let mut reused = Thread::new();
        reused.set_instructions("You are an expert assistant");
        reused.push(Message::user("hi")).unwrap();
        reused.clear();
        reused.set_instructions("You are an expert assistant");

        let mut fresh = Thread::new();
        fresh.set_instructions("You are an expert assistant");

        assert_eq!(reused, fresh);
        assert_eq!(reused.len(), 1);
    }
}

//! Run state and usage accounting types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use switchboard_llm::{Message, Usage};

/// Callback fired once for every message appended to the thread, whether it
/// came from the caller, the provider, or the tool dispatcher.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Run State
// ─────────────────────────────────────────────────────────────────────────────

/// The assistant's position in the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Ready to accept a run.
    Ready,
    /// Driving provider calls.
    InProgress,
    /// Pending tool calls await execution (by the loop or the caller).
    RequiresAction,
    /// The run reached a normal end.
    Completed,
    /// The run ended in failure.
    Failed,
}

impl RunState {
    /// Whether this state ends a run unconditionally.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunState::Ready => "ready",
            RunState::InProgress => "in_progress",
            RunState::RequiresAction => "requires_action",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(label)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage Counters
// ─────────────────────────────────────────────────────────────────────────────

/// Running token totals across the life of an assistant.
///
/// Monotonically non-decreasing; reset only by constructing a new assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Accumulated prompt tokens.
    pub prompt_tokens: u64,
    /// Accumulated completion tokens.
    pub completion_tokens: u64,
    /// Accumulated total tokens.
    pub total_tokens: u64,
}

impl UsageCounters {
    /// Fold one call's usage into the running totals.
    ///
    /// Unreported counts contribute nothing; the total falls back to the
    /// sum of sub-counts when the vendor reports no total of its own.
    pub fn record(&mut self, usage: &Usage) {
        self.prompt_tokens += u64::from(usage.prompt_tokens.unwrap_or(0));
        self.completion_tokens += u64::from(usage.completion_tokens.unwrap_or(0));
        self.total_tokens += u64::from(usage.total().unwrap_or(0));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_terminal() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Ready.is_terminal());
        assert!(!RunState::InProgress.is_terminal());
        assert!(!RunState::RequiresAction.is_terminal());
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::RequiresAction.to_string(), "requires_action");
        assert_eq!(RunState::Ready.to_string(), "ready");
    }

    #[test]
    fn test_usage_counters_accumulate() {
        let mut counters = UsageCounters::default();
        counters.record(&Usage::new(Some(10), Some(20), Some(30)));
        counters.record(&Usage::new(Some(5), Some(7), None));

        assert_eq!(counters.prompt_tokens, 15);
        assert_eq!(counters.completion_tokens, 27);
        assert_eq!(counters.total_tokens, 42);
    }

    #[test]
    fn test_usage_counters_partial_reports() {
        let mut counters = UsageCounters::default();
        counters.record(&Usage::new(Some(10), None, None));

        assert_eq!(counters.prompt_tokens, 10);
        assert_eq!(counters.completion_tokens, 0);
        // No total and no completion count: the total stays put
        assert_eq!(counters.total_tokens, 0);
    }

    #[test]
    fn test_usage_invariant_with_both_subcounts() {
        let mut counters = UsageCounters::default();
        for (prompt, completion) in [(12, 15), (20, 15), (7, 3)] {
            counters.record(&Usage::new(Some(prompt), Some(completion), None));
        }
        assert_eq!(
            counters.total_tokens,
            counters.prompt_tokens + counters.completion_tokens
        );
    }
}

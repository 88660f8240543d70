//! Per-run state threaded through the phases.

use std::collections::{BTreeMap, HashMap};

use taskflow_core::{ChatMessage, Plan, Role, Task};
use uuid::Uuid;

use crate::state_machine::RunState;

/// Failure counts per task key, scoped to one run.
#[derive(Debug, Clone, Default)]
pub struct FailureCounters {
    counts: HashMap<String, u32>,
}

impl FailureCounters {
    /// Record one more failure and return the new count.
    pub fn record_failure(&mut self, key: &str) -> u32 {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset(&mut self, key: &str) {
        self.counts.remove(key);
    }

    pub fn get(&self, key: &str) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn is_exhausted(&self, key: &str, max_retries: u32) -> bool {
        self.get(key) >= max_retries
    }

    /// Non-zero counts, sorted by key.
    pub fn snapshot(&self) -> BTreeMap<String, u32> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(key, count)| (key.clone(), *count))
            .collect()
    }
}

/// Drop history entries that cannot be replayed to a model.
///
/// Tool traffic and blank messages are removed, tool call requests are
/// stripped from assistant messages, and only the `limit` most recent
/// entries are kept.
pub fn trim_history(history: Vec<ChatMessage>, limit: usize) -> Vec<ChatMessage> {
    let mut kept: Vec<ChatMessage> = history
        .into_iter()
        .filter(|m| m.role != Role::Tool && !m.is_blank())
        .map(|mut m| {
            m.tool_calls.clear();
            m
        })
        .collect();

    if kept.len() > limit {
        kept.drain(..kept.len() - limit);
    }
    kept
}

/// State of one workflow run, owned by the runner until the run ends.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub session_id: String,
    pub query: String,
    /// Conversation history preceding the query, followed by the
    /// results of the steps executed so far
    pub history: Vec<ChatMessage>,
    pub failures: FailureCounters,
    pub max_retries: u32,
    pub terminated: bool,
    pub state: RunState,
    /// Transitions taken so far
    pub steps: u32,
    /// Last known plan, kept even when the store lags behind
    pub plan: Plan,
    /// False when the last plan write failed
    pub plan_synced: bool,
    pub planner_output: Option<String>,
    pub active_task: Option<Task>,
    /// Messages exchanged while executing the active task
    pub step_messages: Vec<ChatMessage>,
    pub tool_rounds: u32,
    pub answer: Option<String>,
}

impl WorkflowRun {
    pub fn new(
        session_id: impl Into<String>,
        query: impl Into<String>,
        history: Vec<ChatMessage>,
        max_retries: u32,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            session_id: session_id.into(),
            query: query.into(),
            history,
            failures: FailureCounters::default(),
            max_retries,
            terminated: false,
            state: RunState::Start,
            steps: 0,
            plan: Plan::default(),
            plan_synced: true,
            planner_output: None,
            active_task: None,
            step_messages: Vec::new(),
            tool_rounds: 0,
            answer: None,
        }
    }

    /// Start working on a task with a fresh step transcript.
    pub fn begin_task(&mut self, task: Task) {
        self.active_task = Some(task);
        self.step_messages.clear();
        self.tool_rounds = 0;
    }

    /// Append the active task's final reply to the run history.
    ///
    /// Returns whether anything was recorded.
    pub fn record_step_result(&mut self) -> bool {
        let Some(task) = &self.active_task else {
            return false;
        };
        let Some(reply) = self.last_step_reply().filter(|m| !m.is_blank()) else {
            return false;
        };

        let result = format!("Result of task {}:\n{}", task.description, reply.content.trim());
        self.history.push(ChatMessage::assistant(result));
        true
    }

    pub fn finish_task(&mut self) {
        self.active_task = None;
        self.step_messages.clear();
        self.tool_rounds = 0;
    }

    /// The last message the model produced in this step, if any.
    pub fn last_step_reply(&self) -> Option<&ChatMessage> {
        self.step_messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_core::ToolCall;

    #[test]
    fn test_failure_counters() {
        let mut counters = FailureCounters::default();

        assert_eq!(counters.record_failure("1"), 1);
        assert_eq!(counters.record_failure("1"), 2);
        assert!(!counters.is_exhausted("1", 3));
        assert_eq!(counters.record_failure("1"), 3);
        assert!(counters.is_exhausted("1", 3));

        counters.reset("1");
        assert_eq!(counters.get("1"), 0);
        assert!(counters.snapshot().is_empty());
    }

    #[test]
    fn test_trim_history_drops_unusable_entries() {
        let call = ToolCall::new("c1", "search", serde_json::json!({}));
        let history = vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("   "),
            ChatMessage::assistant_with_tools("looking", vec![call.clone()]),
            ChatMessage::tool_result(&call, "{}"),
            ChatMessage::assistant("found it"),
        ];

        let trimmed = trim_history(history, 20);
        assert_eq!(trimmed.len(), 3);
        assert!(trimmed.iter().all(|m| m.tool_calls.is_empty()));
        assert!(trimmed.iter().all(|m| m.role != Role::Tool));
    }

    #[test]
    fn test_trim_history_keeps_most_recent() {
        let history: Vec<_> = (0..10)
            .map(|i| ChatMessage::user(format!("message {i}")))
            .collect();

        let trimmed = trim_history(history, 3);
        let contents: Vec<_> = trimmed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 7", "message 8", "message 9"]);

        assert!(trim_history(vec![ChatMessage::user("x")], 0).is_empty());
    }

    #[test]
    fn test_begin_and_finish_task() {
        let mut run = WorkflowRun::new("s1", "do it", Vec::new(), 3);
        run.step_messages.push(ChatMessage::assistant("stale"));
        run.tool_rounds = 2;

        run.begin_task(Task::new("1", "1. Search", 1));
        assert_eq!(run.active_task.as_ref().map(|t| t.key.as_str()), Some("1"));
        assert!(run.step_messages.is_empty());
        assert_eq!(run.tool_rounds, 0);

        run.step_messages.push(ChatMessage::assistant("done"));
        assert_eq!(run.last_step_reply().unwrap().content, "done");

        run.finish_task();
        assert!(run.active_task.is_none());
    }

    #[test]
    fn test_record_step_result() {
        let mut run = WorkflowRun::new("s1", "do it", vec![ChatMessage::user("earlier")], 3);
        assert!(!run.record_step_result());

        run.begin_task(Task::new("1", "1. Search", 1));
        run.step_messages.push(ChatMessage::assistant("The ticket id is TK-4242"));
        run.step_messages.push(ChatMessage::user("ignored"));
        assert!(run.record_step_result());

        assert_eq!(run.history.len(), 2);
        assert_eq!(run.history[1].role, Role::Assistant);
        assert_eq!(
            run.history[1].content,
            "Result of task 1. Search:\nThe ticket id is TK-4242"
        );

        // Tool requests without text leave nothing to record
        let call = ToolCall::new("c1", "search", serde_json::json!({}));
        run.begin_task(Task::new("2", "2. Reply", 2));
        run.step_messages
            .push(ChatMessage::assistant_with_tools("", vec![call]));
        assert!(!run.record_step_result());
        assert_eq!(run.history.len(), 2);
    }
}

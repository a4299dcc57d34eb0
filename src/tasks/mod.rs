//! Prompt task model and task generation.
//!
//! A [`PromptTask`] is the immutable unit of work the engine consumes: one
//! user query against a sampled tool set, optionally preceded by conversation
//! history. Tasks are produced by the [`TaskGenerator`] from a
//! [`ToolRegistry`] catalog and consumed exactly once by the scheduler.

mod generator;
mod registry;

pub use generator::{TaskGenerator, ToolCount, DEFAULT_SYSTEM_PROMPT};
pub use registry::{CatalogError, ToolRegistry, ToolSpec};

use serde::{Deserialize, Serialize};

use crate::gateway::Message;

/// Whether a task expects a single tool call or a chained sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SingleTurn,
    MultiTurn,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::SingleTurn => write!(f, "single"),
            TaskKind::MultiTurn => write!(f, "multi"),
        }
    }
}

/// One generation unit: a user query, a tool set, optional history, and a
/// system prompt. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTask {
    /// Unique task identifier.
    pub id: String,
    /// Single-turn vs multi-turn flag.
    pub kind: TaskKind,
    /// Ordered tool set available to the model. Never empty.
    pub tools: Vec<ToolSpec>,
    /// System prompt text.
    pub system_prompt: String,
    /// Prior conversation turns, alternating user/assistant. Does not
    /// include the pending `user_query`.
    pub history: Vec<Message>,
    /// The current user query.
    pub user_query: String,
    /// Tool names (qualified `name@version`) the task was built around.
    /// Advisory metadata only; never used to gate validation.
    pub expected_tools: Vec<String>,
}

impl PromptTask {
    /// Serialize the tool set as the JSON text embedded in prompts and
    /// exported samples.
    pub fn tools_json(&self) -> String {
        let wire: Vec<_> = self.tools.iter().map(ToolSpec::to_wire).collect();
        serde_json::to_string(&wire).unwrap_or_else(|_| "[]".to_string())
    }

    /// The full message list for this task: history followed by the pending
    /// user query.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = self.history.clone();
        messages.push(Message::user(self.user_query.clone()));
        messages
    }

    /// Check the structural invariants: non-empty tool set, non-empty query,
    /// and history alternating user/assistant starting with a user turn.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.tools.is_empty() {
            return Err("task has an empty tool set".to_string());
        }
        if self.user_query.trim().is_empty() {
            return Err("task has an empty user query".to_string());
        }
        for (i, msg) in self.history.iter().enumerate() {
            let expected = if i % 2 == 0 { "user" } else { "assistant" };
            if msg.role != expected {
                return Err(format!(
                    "history turn {} has role '{}', expected '{}'",
                    i, msg.role, expected
                ));
            }
        }
        Ok(())
    }
}

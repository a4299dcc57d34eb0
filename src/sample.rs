//! Candidate sample model and tool-invocation extraction.
//!
//! A [`CandidateSample`] is the output of one synthesis pipeline: the task
//! context plus a chosen/rejected response pair and optional self-evaluation
//! scores. Responses may embed a structured tool invocation between
//! `<function_call>` delimiters; [`ToolInvocation::extract`] pulls it out.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::Message;
use crate::tasks::TaskKind;

fn function_call_regex() -> Option<Regex> {
    Regex::new(r"(?s)<function_call>\s*(.*?)\s*</function_call>").ok()
}

/// A structured tool invocation embedded in a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Qualified tool name (`name@version`).
    pub name: String,
    /// Argument mapping.
    pub arguments: Value,
}

/// Result of looking for a tool invocation inside a response string.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationScan {
    /// No `<function_call>` delimiters present.
    Absent,
    /// Delimiters present and the payload parsed as a valid invocation.
    Found(ToolInvocation),
    /// Delimiters present but the payload is not a valid invocation object.
    Malformed(String),
}

impl ToolInvocation {
    /// Scan a response for an embedded tool invocation.
    ///
    /// The payload between the delimiters must be a JSON object with a string
    /// `name` and an object `arguments`. A present-but-unparseable payload is
    /// reported as [`InvocationScan::Malformed`], which is distinct from the
    /// delimiters simply being absent.
    pub fn extract(response: &str) -> InvocationScan {
        let Some(re) = function_call_regex() else {
            return InvocationScan::Absent;
        };
        let Some(caps) = re.captures(response) else {
            return InvocationScan::Absent;
        };
        let payload = &caps[1];

        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => return InvocationScan::Malformed(format!("invalid JSON payload: {}", e)),
        };

        let Some(obj) = value.as_object() else {
            return InvocationScan::Malformed("payload is not a JSON object".to_string());
        };

        let Some(name) = obj.get("name").and_then(Value::as_str) else {
            return InvocationScan::Malformed("payload missing string 'name'".to_string());
        };

        let arguments = match obj.get("arguments") {
            Some(args) if args.is_object() => args.clone(),
            Some(_) => {
                return InvocationScan::Malformed("'arguments' is not an object".to_string())
            }
            None => return InvocationScan::Malformed("payload missing 'arguments'".to_string()),
        };

        InvocationScan::Found(ToolInvocation {
            name: name.to_string(),
            arguments,
        })
    }
}

/// Self-evaluation scores attached by the optional third synthesis step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalScores {
    /// Quality of the chosen response, 0-10.
    pub quality: f64,
    /// Textual similarity between chosen and rejected, 0-100.
    pub similarity: f64,
}

/// One synthesized preference pair, carrying its task context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSample {
    /// Identifier of the originating task.
    pub task_id: String,
    /// Single-turn vs multi-turn, copied from the task.
    pub kind: TaskKind,
    /// System prompt text.
    pub system: String,
    /// Tool set serialized as JSON text.
    pub tools: String,
    /// Conversation turns including the final user query.
    pub conversations: Vec<Message>,
    /// Preferred response.
    pub chosen: String,
    /// Dispreferred response.
    pub rejected: String,
    /// Optional self-evaluation scores. Advisory metadata unless the
    /// validator is configured with thresholds.
    pub scores: Option<EvalScores>,
}

/// Validation result for one candidate sample.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Accepted(CandidateSample),
    /// Rejected with every failed check listed, not just the first.
    Rejected(CandidateSample, Vec<String>),
}

impl ValidationOutcome {
    /// Whether the sample was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    /// The sample, regardless of classification.
    pub fn sample(&self) -> &CandidateSample {
        match self {
            ValidationOutcome::Accepted(s) | ValidationOutcome::Rejected(s, _) => s,
        }
    }
}

/// Terminal state of one task pipeline.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Synthesis succeeded and the sample passed validation.
    Valid(CandidateSample),
    /// Synthesis succeeded but validation rejected the sample.
    Invalid(CandidateSample, Vec<String>),
    /// Synthesis (or the pipeline around it) failed for this task only.
    Failed { task_id: String, error: String },
}

impl TaskOutcome {
    /// Identifier of the task this outcome belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            TaskOutcome::Valid(s) | TaskOutcome::Invalid(s, _) => &s.task_id,
            TaskOutcome::Failed { task_id, .. } => task_id,
        }
    }
}

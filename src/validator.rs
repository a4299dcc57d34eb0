//! Structural validation of candidate samples.
//!
//! Validation is a pure function of the sample and the configuration: the
//! same inputs always classify the same way. Mandatory checks are collected
//! rather than short-circuited so a rejected sample lists every failed check.

use crate::sample::{CandidateSample, InvocationScan, ToolInvocation, ValidationOutcome};

/// Score thresholds that turn advisory self-evaluation scores into gates.
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    /// Minimum acceptable chosen-response quality (0-10).
    pub min_quality: f64,
    /// Maximum acceptable chosen/rejected similarity (0-100).
    pub max_similarity: f64,
}

/// Validator configuration.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Require the chosen response to embed a well-formed tool invocation.
    /// When off, free-text answers without any invocation are accepted,
    /// since some task types legitimately call no tool.
    pub require_chosen_invocation: bool,
    /// Same requirement for the rejected response.
    pub require_rejected_invocation: bool,
    /// When set, self-evaluation scores gate acceptance. When `None` the
    /// scores are advisory metadata only.
    pub thresholds: Option<QualityThresholds>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            require_chosen_invocation: true,
            require_rejected_invocation: false,
            thresholds: None,
        }
    }
}

/// Applies structural and optional score checks to candidate samples.
#[derive(Debug, Clone, Default)]
pub struct SampleValidator {
    config: ValidatorConfig,
}

impl SampleValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Classify a candidate sample as Accepted or Rejected.
    ///
    /// Pure and idempotent: no state is read or written besides the sample
    /// and the configuration captured at construction.
    pub fn validate(&self, sample: CandidateSample) -> ValidationOutcome {
        let mut reasons = Vec::new();

        if sample.system.trim().is_empty() {
            reasons.push("system prompt is empty".to_string());
        }
        if !tools_field_is_populated(&sample.tools) {
            reasons.push("tool set is empty or not a JSON array".to_string());
        }
        if sample.conversations.is_empty() {
            reasons.push("conversation has no turns".to_string());
        }
        if sample.chosen.trim().is_empty() {
            reasons.push("chosen response is empty".to_string());
        }
        if sample.rejected.trim().is_empty() {
            reasons.push("rejected response is empty".to_string());
        }
        if !sample.chosen.is_empty() && sample.chosen == sample.rejected {
            reasons.push("chosen and rejected responses are identical".to_string());
        }

        let known_tools = tool_names(&sample.tools);
        self.check_invocation(&sample.chosen, "chosen", self.config.require_chosen_invocation, &known_tools, &mut reasons);
        self.check_invocation(&sample.rejected, "rejected", self.config.require_rejected_invocation, &known_tools, &mut reasons);

        if let Some(thresholds) = self.config.thresholds {
            match sample.scores {
                Some(scores) => {
                    if scores.quality < thresholds.min_quality {
                        reasons.push(format!(
                            "quality score {:.1} below minimum {:.1}",
                            scores.quality, thresholds.min_quality
                        ));
                    }
                    if scores.similarity > thresholds.max_similarity {
                        reasons.push(format!(
                            "similarity score {:.1} above maximum {:.1}",
                            scores.similarity, thresholds.max_similarity
                        ));
                    }
                }
                None => {
                    reasons.push("score thresholds configured but sample has no scores".to_string())
                }
            }
        }

        if reasons.is_empty() {
            ValidationOutcome::Accepted(sample)
        } else {
            tracing::debug!(task_id = %sample.task_id, reasons = ?reasons, "Sample rejected");
            ValidationOutcome::Rejected(sample, reasons)
        }
    }

    /// An invocation present in the text must always be well formed and name
    /// a tool from the sample's tool set; whether one must be present at all
    /// is configurable per response side.
    fn check_invocation(
        &self,
        response: &str,
        side: &str,
        required: bool,
        known_tools: &[String],
        reasons: &mut Vec<String>,
    ) {
        match ToolInvocation::extract(response) {
            InvocationScan::Found(invocation) => {
                if !known_tools.iter().any(|name| name == &invocation.name) {
                    reasons.push(format!(
                        "{} response invokes unknown tool '{}'",
                        side, invocation.name
                    ));
                }
            }
            InvocationScan::Absent => {
                if required {
                    reasons.push(format!("{} response contains no tool invocation", side));
                }
            }
            InvocationScan::Malformed(detail) => {
                reasons.push(format!("{} response has a malformed tool invocation: {}", side, detail));
            }
        }
    }
}

fn tools_field_is_populated(tools: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(tools)
        .ok()
        .and_then(|v| v.as_array().map(|a| !a.is_empty()))
        .unwrap_or(false)
}

/// Tool names declared in the sample's serialized tool set.
fn tool_names(tools: &str) -> Vec<String> {
    serde_json::from_str::<serde_json::Value>(tools)
        .ok()
        .and_then(|v| {
            v.as_array().map(|a| {
                a.iter()
                    .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string)
                    .collect()
            })
        })
        .unwrap_or_default()
}

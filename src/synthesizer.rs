//! Sample synthesis: one prompt task in, one candidate preference pair out.
//!
//! Synthesis is sequential by design. The rejected response is generated
//! *after* the chosen response because the smart strategy shows the model the
//! chosen answer and asks for a plausible-but-inferior alternative. An
//! optional third call self-evaluates the pair; its scores are advisory
//! metadata and never gate acceptance on their own.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::SynthesisError;
use crate::gateway::{Message, ModelGateway};
use crate::sample::{CandidateSample, EvalScores};
use crate::tasks::PromptTask;

const CHOSEN_TEMPERATURE: f64 = 0.7;
const REJECTED_TEMPERATURE: f64 = 0.9;

/// How the rejected (dispreferred) response is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedStrategy {
    /// Show the model the chosen response and ask for a deliberately
    /// inferior alternative: wrong tool, incomplete arguments, an
    /// unwarranted refusal, or a misread of intent.
    Smart,
    /// Regenerate from the task context alone at a higher temperature and
    /// hope it diverges. Cheaper, lower contrast.
    Naive,
}

/// Turns prompt tasks into candidate samples via sequential gateway calls.
pub struct SampleSynthesizer {
    gateway: Arc<dyn ModelGateway>,
    strategy: RejectedStrategy,
    self_evaluate: bool,
}

impl SampleSynthesizer {
    /// Create a synthesizer with the smart rejected strategy and
    /// self-evaluation disabled.
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            strategy: RejectedStrategy::Smart,
            self_evaluate: false,
        }
    }

    /// Select the rejected-generation strategy.
    pub fn with_strategy(mut self, strategy: RejectedStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enable or disable the self-evaluation call.
    pub fn with_self_evaluation(mut self, enabled: bool) -> Self {
        self.self_evaluate = enabled;
        self
    }

    /// Synthesize one candidate sample from a task.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::Generation`] when a required step produces
    /// unusable output (empty response, or chosen and rejected identical),
    /// and [`SynthesisError::Gateway`] when a gateway call fails after its
    /// internal retries.
    pub async fn synthesize(&self, task: &PromptTask) -> Result<CandidateSample, SynthesisError> {
        let chosen = self.generate_chosen(task).await?;
        if chosen.trim().is_empty() {
            return Err(SynthesisError::Generation(
                "chosen generation returned an empty response".to_string(),
            ));
        }

        let rejected = self.generate_rejected(task, &chosen).await?;
        if rejected.trim().is_empty() {
            return Err(SynthesisError::Generation(
                "rejected generation returned an empty response".to_string(),
            ));
        }
        if chosen == rejected {
            return Err(SynthesisError::Generation(
                "rejected response is identical to chosen".to_string(),
            ));
        }

        let scores = if self.self_evaluate {
            self.evaluate(task, &chosen, &rejected).await
        } else {
            None
        };

        Ok(CandidateSample {
            task_id: task.id.clone(),
            kind: task.kind,
            system: task.system_prompt.clone(),
            tools: task.tools_json(),
            conversations: task.messages(),
            chosen,
            rejected,
            scores,
        })
    }

    async fn generate_chosen(&self, task: &PromptTask) -> Result<String, SynthesisError> {
        let mut messages = vec![Message::system(chosen_system_prompt(task))];
        messages.extend(task.messages());

        tracing::debug!(task_id = %task.id, "Generating chosen response");
        let response = self.gateway.send(&messages, CHOSEN_TEMPERATURE).await?;
        Ok(response)
    }

    async fn generate_rejected(
        &self,
        task: &PromptTask,
        chosen: &str,
    ) -> Result<String, SynthesisError> {
        let (system, temperature) = match self.strategy {
            RejectedStrategy::Smart => (smart_rejected_system_prompt(task, chosen), REJECTED_TEMPERATURE),
            RejectedStrategy::Naive => (chosen_system_prompt(task), 1.2),
        };

        let mut messages = vec![Message::system(system)];
        messages.extend(task.messages());

        tracing::debug!(task_id = %task.id, strategy = ?self.strategy, "Generating rejected response");
        let response = self.gateway.send(&messages, temperature).await?;
        Ok(response)
    }

    /// Self-evaluation call. Parse failures degrade to an unscored sample
    /// rather than failing the task, since scores are advisory.
    async fn evaluate(&self, task: &PromptTask, chosen: &str, rejected: &str) -> Option<EvalScores> {
        let prompt = format!(
            "Rate the following preference pair for the user query below.\n\n\
             User query: {}\n\nChosen response:\n{}\n\nRejected response:\n{}\n\n\
             Reply with only a JSON object: {{\"quality\": <0-10 quality of the chosen \
             response>, \"similarity\": <0-100 textual similarity between the two>}}",
            task.user_query, chosen, rejected
        );

        let messages = vec![
            Message::system("You are a strict data-quality rater. Reply with JSON only."),
            Message::user(prompt),
        ];

        match self.gateway.send(&messages, 0.0).await {
            Ok(response) => match parse_eval_response(&response) {
                Some(scores) => Some(scores),
                None => {
                    tracing::warn!(task_id = %task.id, "Self-evaluation response did not parse, keeping sample unscored");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "Self-evaluation call failed, keeping sample unscored");
                None
            }
        }
    }
}

fn chosen_system_prompt(task: &PromptTask) -> String {
    format!(
        "{}\n\nAvailable tools:\n{}",
        task.system_prompt,
        task.tools_json()
    )
}

fn smart_rejected_system_prompt(task: &PromptTask, chosen: &str) -> String {
    format!(
        "{}\n\nAvailable tools:\n{}\n\n\
         A correct response to the upcoming user query is:\n{}\n\n\
         Produce a DIFFERENT response that looks plausible but is inferior in one \
         of these ways: calls the wrong tool, passes incomplete or incorrect \
         arguments, refuses to call any tool when one is needed, or misreads the \
         user's intent. Keep the same response format. Do not repeat the correct \
         response.",
        task.system_prompt,
        task.tools_json(),
        chosen
    )
}

#[derive(Deserialize)]
struct EvalResponse {
    quality: f64,
    similarity: f64,
}

/// Parse the self-evaluation JSON, tolerating a markdown code fence around it.
fn parse_eval_response(response: &str) -> Option<EvalScores> {
    let text = strip_code_fence(response.trim());
    let parsed: EvalResponse = serde_json::from_str(text).ok()?;
    if !(0.0..=10.0).contains(&parsed.quality) || !(0.0..=100.0).contains(&parsed.similarity) {
        return None;
    }
    Some(EvalScores {
        quality: parsed.quality,
        similarity: parsed.similarity,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

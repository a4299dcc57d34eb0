//! Bounded-concurrency fan-out over independent task pipelines.
//!
//! Every task is spawned immediately but only K pipelines may hold an
//! execution permit at once, so at most K are issuing gateway calls at any
//! instant. Failures are isolated at the pipeline boundary: one task's error
//! becomes a `Failed` outcome and never delays or cancels its neighbors. The
//! one exception is an authentication failure, which indicates a
//! configuration problem rather than a transient fault and aborts the whole
//! run.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::EngineError;
use crate::sample::{CandidateSample, TaskOutcome, ValidationOutcome};
use crate::synthesizer::SampleSynthesizer;
use crate::tasks::PromptTask;
use crate::validator::SampleValidator;

use super::progress::{LogSink, ProgressSink, ProgressSnapshot, ProgressTracker};
use super::run::{CancelToken, RunState};

/// Result of one batch run: every resolved outcome in task submission order,
/// the terminal state, and the final progress snapshot.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    pub state: RunState,
    pub snapshot: ProgressSnapshot,
    /// Set when the run was aborted by an authentication failure, so callers
    /// can surface it distinctly from transient per-task errors.
    pub auth_failure: Option<String>,
}

impl RunReport {
    /// Samples that passed validation.
    pub fn valid_samples(&self) -> Vec<&CandidateSample> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TaskOutcome::Valid(sample) => Some(sample),
                _ => None,
            })
            .collect()
    }

    /// Samples that were synthesized but rejected, with their reasons.
    pub fn invalid_samples(&self) -> Vec<(&CandidateSample, &[String])> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TaskOutcome::Invalid(sample, reasons) => Some((sample, reasons.as_slice())),
                _ => None,
            })
            .collect()
    }
}

/// Executes batches of task pipelines with bounded concurrency.
pub struct Scheduler {
    synthesizer: Arc<SampleSynthesizer>,
    validator: Arc<SampleValidator>,
    concurrency: usize,
    progress_sink: Option<ProgressSink>,
    log_sink: Option<LogSink>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] when `concurrency` is 0.
    pub fn new(
        synthesizer: Arc<SampleSynthesizer>,
        validator: SampleValidator,
        concurrency: usize,
    ) -> Result<Self, EngineError> {
        if concurrency < 1 {
            return Err(EngineError::InvalidConcurrency(concurrency));
        }
        Ok(Self {
            synthesizer,
            validator: Arc::new(validator),
            concurrency,
            progress_sink: None,
            log_sink: None,
        })
    }

    /// Install a callback invoked with a snapshot after every terminal task
    /// classification. Must not block; observers should buffer or drop.
    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    /// Install a callback for coarse free-text status lines.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Run every task to a terminal outcome, or stop early on cancellation.
    ///
    /// Outcomes are returned in task submission order regardless of
    /// completion order, so downstream batch numbering stays reproducible.
    /// Tasks skipped due to cancellation produce no outcome at all.
    pub async fn run(&self, tasks: Vec<PromptTask>, cancel: CancelToken) -> RunReport {
        let total = tasks.len();
        let tracker = Arc::new(ProgressTracker::new(total));

        if tasks.is_empty() {
            return RunReport {
                outcomes: Vec::new(),
                state: RunState::Completed,
                snapshot: tracker.snapshot(),
                auth_failure: None,
            };
        }

        self.log(format!(
            "Starting batch run: {} tasks, concurrency {}",
            total, self.concurrency
        ));
        tracing::info!(tasks = total, concurrency = self.concurrency, "Starting batch run");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let auth_failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let pipelines = tasks.into_iter().enumerate().map(|(index, task)| {
            let semaphore = Arc::clone(&semaphore);
            let tracker = Arc::clone(&tracker);
            let cancel = cancel.clone();
            let auth_failure = Arc::clone(&auth_failure);
            let synthesizer = Arc::clone(&self.synthesizer);
            let validator = Arc::clone(&self.validator);
            let progress_sink = self.progress_sink.clone();
            let log_sink = self.log_sink.clone();

            async move {
                // Check before queueing for a permit and again after getting
                // one, so a cancelled run stops admitting work promptly.
                if cancel.is_cancelled() {
                    return None;
                }
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if cancel.is_cancelled() {
                    return None;
                }

                let outcome = match synthesizer.synthesize(&task).await {
                    Ok(candidate) => match validator.validate(candidate) {
                        ValidationOutcome::Accepted(sample) => TaskOutcome::Valid(sample),
                        ValidationOutcome::Rejected(sample, reasons) => {
                            TaskOutcome::Invalid(sample, reasons)
                        }
                    },
                    Err(e) => {
                        if e.is_authentication() {
                            let mut slot = match auth_failure.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            if slot.is_none() {
                                *slot = Some(e.to_string());
                            }
                            drop(slot);
                            // Config fault, not a per-task fault: stop the run.
                            cancel.cancel();
                            tracing::error!(task_id = %task.id, error = %e, "Authentication failure, aborting run");
                        } else {
                            tracing::warn!(task_id = %task.id, error = %e, "Task pipeline failed");
                        }
                        if let Some(sink) = &log_sink {
                            sink(format!("Task {} failed: {}", task.id, e));
                        }
                        TaskOutcome::Failed {
                            task_id: task.id.clone(),
                            error: e.to_string(),
                        }
                    }
                };

                let snapshot = tracker.record(&outcome);
                if let Some(sink) = &progress_sink {
                    sink(snapshot);
                }
                Some((index, outcome))
            }
        });

        let mut resolved: Vec<(usize, TaskOutcome)> =
            join_all(pipelines).await.into_iter().flatten().collect();
        resolved.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<TaskOutcome> = resolved.into_iter().map(|(_, o)| o).collect();

        let auth_failure = match auth_failure.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let state = if cancel.is_cancelled() {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        let snapshot = tracker.snapshot();

        self.log(format!(
            "Batch run {}: {}/{} completed, {} valid, {} invalid, {} failed",
            state, snapshot.completed, total, snapshot.succeeded_valid,
            snapshot.succeeded_invalid, snapshot.failed
        ));
        tracing::info!(
            state = %state,
            completed = snapshot.completed,
            valid = snapshot.succeeded_valid,
            invalid = snapshot.succeeded_invalid,
            failed = snapshot.failed,
            "Batch run finished"
        );

        RunReport {
            outcomes,
            state,
            snapshot,
            auth_failure,
        }
    }

    fn log(&self, line: String) {
        if let Some(sink) = &self.log_sink {
            sink(line);
        }
    }
}

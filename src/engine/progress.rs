//! Shared progress aggregation for a batch run.
//!
//! Counters are merged inside a short mutex-guarded critical section; every
//! merge produces an immutable [`ProgressSnapshot`] handed to the progress
//! sink. The critical section is pure arithmetic so it never serializes the
//! network-bound work around it.

use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::sample::TaskOutcome;
use crate::tasks::TaskKind;

/// Maximum number of recent error messages kept in a snapshot.
const ERROR_WINDOW: usize = 10;

/// Immutable point-in-time aggregate of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// Total tasks in the run.
    pub total: usize,
    /// Tasks that reached a terminal outcome. Always equals
    /// `succeeded_valid + succeeded_invalid + failed`.
    pub completed: usize,
    /// Tasks whose pipeline failed.
    pub failed: usize,
    /// Samples that passed validation.
    pub succeeded_valid: usize,
    /// Samples that were synthesized but rejected by validation.
    pub succeeded_invalid: usize,
    /// Completed single-turn tasks.
    pub single_turn: usize,
    /// Completed multi-turn tasks.
    pub multi_turn: usize,
    /// Seconds elapsed since the run started.
    pub elapsed_secs: f64,
    /// Completed tasks per second.
    pub rate: f64,
    /// valid / (valid + invalid), as a percentage. 0 when nothing has
    /// finished synthesis yet.
    pub validation_success_rate: f64,
    /// Most recent error messages, oldest first, capped at a fixed window.
    pub recent_errors: Vec<String>,
}

/// Callback invoked with a snapshot after every terminal task classification.
pub type ProgressSink = std::sync::Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Callback invoked with coarse free-text status lines.
pub type LogSink = std::sync::Arc<dyn Fn(String) + Send + Sync>;

struct Counters {
    completed: usize,
    failed: usize,
    succeeded_valid: usize,
    succeeded_invalid: usize,
    single_turn: usize,
    multi_turn: usize,
    recent_errors: Vec<String>,
}

/// Mutex-guarded aggregate shared by all in-flight pipelines of one run.
pub struct ProgressTracker {
    total: usize,
    started: Instant,
    counters: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started: Instant::now(),
            counters: Mutex::new(Counters {
                completed: 0,
                failed: 0,
                succeeded_valid: 0,
                succeeded_invalid: 0,
                single_turn: 0,
                multi_turn: 0,
                recent_errors: Vec::new(),
            }),
        }
    }

    /// Merge one terminal outcome and return the resulting snapshot.
    ///
    /// The returned snapshot reflects a fully merged state; callers never
    /// observe a partially updated count.
    pub fn record(&self, outcome: &TaskOutcome) -> ProgressSnapshot {
        let mut c = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        c.completed += 1;
        match outcome {
            TaskOutcome::Valid(sample) => {
                c.succeeded_valid += 1;
                match sample.kind {
                    TaskKind::SingleTurn => c.single_turn += 1,
                    TaskKind::MultiTurn => c.multi_turn += 1,
                }
            }
            TaskOutcome::Invalid(sample, _) => {
                c.succeeded_invalid += 1;
                match sample.kind {
                    TaskKind::SingleTurn => c.single_turn += 1,
                    TaskKind::MultiTurn => c.multi_turn += 1,
                }
            }
            TaskOutcome::Failed { task_id, error } => {
                c.failed += 1;
                c.recent_errors.push(format!("{}: {}", task_id, error));
                if c.recent_errors.len() > ERROR_WINDOW {
                    let overflow = c.recent_errors.len() - ERROR_WINDOW;
                    c.recent_errors.drain(..overflow);
                }
            }
        }

        self.snapshot_locked(&c)
    }

    /// Snapshot the current state without recording anything.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let c = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.snapshot_locked(&c)
    }

    fn snapshot_locked(&self, c: &Counters) -> ProgressSnapshot {
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            c.completed as f64 / elapsed_secs
        } else {
            0.0
        };
        let synthesized = c.succeeded_valid + c.succeeded_invalid;
        let validation_success_rate = if synthesized > 0 {
            c.succeeded_valid as f64 / synthesized as f64 * 100.0
        } else {
            0.0
        };

        ProgressSnapshot {
            total: self.total,
            completed: c.completed,
            failed: c.failed,
            succeeded_valid: c.succeeded_valid,
            succeeded_invalid: c.succeeded_invalid,
            single_turn: c.single_turn,
            multi_turn: c.multi_turn,
            elapsed_secs,
            rate,
            validation_success_rate,
            recent_errors: c.recent_errors.clone(),
        }
    }
}

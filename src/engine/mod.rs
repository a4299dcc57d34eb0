//! Concurrent batch engine: bounded fan-out, progress aggregation,
//! cooperative cancellation.

mod progress;
mod run;
mod scheduler;

pub use progress::{LogSink, ProgressSink, ProgressSnapshot, ProgressTracker};
pub use run::{CancelToken, RunState};
pub use scheduler::{RunReport, Scheduler};

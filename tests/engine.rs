//! Integration tests for the concurrent batch engine.
//!
//! These drive the full synthesize -> validate -> classify pipeline against
//! instrumented fake gateways: one that records the concurrent-call
//! high-water mark, one that fails scripted tasks, and one that exercises
//! the retry contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dpoforge::engine::{CancelToken, RunState, Scheduler};
use dpoforge::gateway::{with_retry, Message, ModelGateway, RetryPolicy};
use dpoforge::sample::TaskOutcome;
use dpoforge::synthesizer::SampleSynthesizer;
use dpoforge::tasks::{PromptTask, TaskKind, ToolSpec};
use dpoforge::validator::{SampleValidator, ValidatorConfig};
use dpoforge::GatewayError;

/// Fake gateway that records the concurrent in-flight high-water mark and
/// fails any task whose messages mention a poisoned marker.
struct InstrumentedGateway {
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
    poison_marker: Option<String>,
}

impl InstrumentedGateway {
    fn new(delay: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            delay,
            poison_marker: None,
        }
    }

    fn with_poison(mut self, marker: impl Into<String>) -> Self {
        self.poison_marker = Some(marker.into());
        self
    }

    fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelGateway for InstrumentedGateway {
    async fn send(
        &self,
        messages: &[Message],
        temperature: f64,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.poison_marker {
            if messages.iter().any(|m| m.content.contains(marker.as_str())) {
                return Err(GatewayError::ServerError {
                    code: 500,
                    message: format!("scripted failure for {}", marker),
                });
            }
        }

        // The chosen and rejected steps use different temperatures, so the
        // pair always differs.
        if temperature < 0.8 {
            Ok("A".to_string())
        } else {
            Ok("B".to_string())
        }
    }
}

fn make_tasks(n: usize) -> Vec<PromptTask> {
    (0..n)
        .map(|i| PromptTask {
            id: format!("task-{}", i),
            kind: if i % 2 == 0 {
                TaskKind::SingleTurn
            } else {
                TaskKind::MultiTurn
            },
            tools: vec![ToolSpec::new(
                "get_weather",
                "Query current weather",
                serde_json::json!({"type": "object", "properties": {}}),
            )],
            system_prompt: "You are a helpful assistant.".to_string(),
            history: Vec::new(),
            user_query: format!("query-{}", i),
            expected_tools: vec!["get_weather@v1".to_string()],
        })
        .collect()
}

fn free_text_validator() -> SampleValidator {
    SampleValidator::new(ValidatorConfig {
        require_chosen_invocation: false,
        require_rejected_invocation: false,
        thresholds: None,
    })
}

fn scheduler_over(gateway: Arc<dyn ModelGateway>, concurrency: usize) -> Scheduler {
    let synthesizer = Arc::new(SampleSynthesizer::new(gateway));
    Scheduler::new(synthesizer, free_text_validator(), concurrency)
        .expect("concurrency is positive")
}

#[tokio::test]
async fn concurrency_never_exceeds_limit() {
    let gateway = Arc::new(InstrumentedGateway::new(Duration::from_millis(5)));
    let scheduler = scheduler_over(gateway.clone(), 3);

    let report = scheduler.run(make_tasks(20), CancelToken::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.outcomes.len(), 20);
    assert!(
        gateway.high_water() <= 3,
        "high-water mark {} exceeded concurrency limit",
        gateway.high_water()
    );
    // The limit was actually exercised, not just never approached
    assert!(gateway.high_water() >= 2);
}

#[tokio::test]
async fn concurrency_of_one_serializes_all_calls() {
    let gateway = Arc::new(InstrumentedGateway::new(Duration::from_millis(2)));
    let scheduler = scheduler_over(gateway.clone(), 1);

    let report = scheduler.run(make_tasks(6), CancelToken::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.outcomes.len(), 6);
    assert_eq!(gateway.high_water(), 1);
}

#[tokio::test]
async fn single_failure_does_not_affect_neighbors() {
    let gateway = Arc::new(
        InstrumentedGateway::new(Duration::from_millis(1)).with_poison("query-7"),
    );
    let scheduler = scheduler_over(gateway, 4);

    let report = scheduler.run(make_tasks(20), CancelToken::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.outcomes.len(), 20);
    assert_eq!(report.snapshot.failed, 1);
    assert_eq!(report.snapshot.succeeded_valid, 19);

    for (i, outcome) in report.outcomes.iter().enumerate() {
        // Outcomes come back in submission order
        assert_eq!(outcome.task_id(), format!("task-{}", i));
        if i == 7 {
            assert!(matches!(outcome, TaskOutcome::Failed { .. }));
        } else {
            assert!(matches!(outcome, TaskOutcome::Valid(_)));
        }
    }
}

#[tokio::test]
async fn three_task_run_reaches_full_success() {
    let gateway = Arc::new(InstrumentedGateway::new(Duration::from_millis(1)));
    let scheduler = scheduler_over(gateway, 2);

    let report = scheduler.run(make_tasks(3), CancelToken::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.snapshot.completed, 3);
    assert_eq!(report.snapshot.succeeded_valid, 3);
    assert_eq!(report.snapshot.failed, 0);
    assert_eq!(report.snapshot.validation_success_rate, 100.0);
    assert_eq!(
        report.snapshot.completed,
        report.snapshot.succeeded_valid + report.snapshot.succeeded_invalid + report.snapshot.failed
    );

    for sample in report.valid_samples() {
        assert_eq!(sample.chosen, "A");
        assert_eq!(sample.rejected, "B");
        assert_ne!(sample.chosen, sample.rejected);
    }
}

#[tokio::test]
async fn progress_snapshots_are_consistent_at_every_step() {
    let gateway = Arc::new(InstrumentedGateway::new(Duration::from_millis(1)));
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink_snapshots = Arc::clone(&snapshots);

    let synthesizer = Arc::new(SampleSynthesizer::new(gateway));
    let scheduler = Scheduler::new(synthesizer, free_text_validator(), 4)
        .expect("concurrency is positive")
        .with_progress_sink(Arc::new(move |snapshot| {
            sink_snapshots.lock().unwrap().push(snapshot);
        }));

    scheduler.run(make_tasks(12), CancelToken::new()).await;

    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 12);

    let mut previous = 0;
    for snapshot in snapshots.iter() {
        // Every emitted snapshot is fully merged and monotonic
        assert_eq!(
            snapshot.completed,
            snapshot.succeeded_valid + snapshot.succeeded_invalid + snapshot.failed
        );
        assert!(snapshot.completed > previous);
        previous = snapshot.completed;
    }
    assert_eq!(snapshots.last().unwrap().completed, 12);
}

#[tokio::test]
async fn cancellation_stops_admission_and_aborts() {
    let gateway = Arc::new(InstrumentedGateway::new(Duration::from_millis(10)));
    let cancel = CancelToken::new();

    let completions = Arc::new(AtomicUsize::new(0));
    let sink_cancel = cancel.clone();
    let sink_completions = Arc::clone(&completions);

    let synthesizer = Arc::new(SampleSynthesizer::new(gateway));
    let scheduler = Scheduler::new(synthesizer, free_text_validator(), 5)
        .expect("concurrency is positive")
        .with_progress_sink(Arc::new(move |snapshot| {
            sink_completions.store(snapshot.completed, Ordering::SeqCst);
            if snapshot.completed >= 10 {
                sink_cancel.cancel();
            }
        }));

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        scheduler.run(make_tasks(50), cancel),
    )
    .await
    .expect("cancelled run must return promptly");

    assert_eq!(report.state, RunState::Aborted);
    assert!(report.outcomes.len() >= 10, "outcomes: {}", report.outcomes.len());
    assert!(report.outcomes.len() < 50, "outcomes: {}", report.outcomes.len());
    assert_eq!(report.snapshot.completed, report.outcomes.len());
}

/// Gateway whose every call reports an authentication failure.
struct BadKeyGateway;

#[async_trait]
impl ModelGateway for BadKeyGateway {
    async fn send(&self, _: &[Message], _: f64) -> Result<String, GatewayError> {
        Err(GatewayError::Authentication("invalid api key".to_string()))
    }
}

#[tokio::test]
async fn authentication_failure_aborts_whole_run() {
    let scheduler = scheduler_over(Arc::new(BadKeyGateway), 2);

    let report = scheduler.run(make_tasks(10), CancelToken::new()).await;

    assert_eq!(report.state, RunState::Aborted);
    let failure = report.auth_failure.expect("auth failure surfaced");
    assert!(failure.contains("invalid api key"));
    // The run stopped early instead of burning through every task
    assert!(report.outcomes.len() < 10);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, TaskOutcome::Failed { .. })));
}

/// Gateway that fails its first two calls with a server error, then
/// succeeds, wrapping the shared retry helper the way real gateways do.
struct FlakyGateway {
    attempts: AtomicUsize,
}

#[async_trait]
impl ModelGateway for FlakyGateway {
    async fn send(&self, _: &[Message], temperature: f64) -> Result<String, GatewayError> {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        with_retry(&policy, |_| {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayError::ServerError {
                        code: 503,
                        message: "unavailable".to_string(),
                    })
                } else if temperature < 0.8 {
                    Ok("A".to_string())
                } else {
                    Ok("B".to_string())
                }
            }
        })
        .await
    }
}

#[tokio::test]
async fn transient_errors_are_retried_to_success() {
    let gateway = Arc::new(FlakyGateway {
        attempts: AtomicUsize::new(0),
    });
    let scheduler = scheduler_over(gateway.clone(), 1);

    let report = scheduler.run(make_tasks(1), CancelToken::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.snapshot.succeeded_valid, 1);
    // Two failed attempts were retried before the pipeline's calls succeeded
    assert!(gateway.attempts.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn validator_rejections_count_as_invalid_not_failed() {
    // Default validator requires a chosen tool invocation; the fake gateway
    // returns bare text, so every sample is synthesized but rejected.
    let gateway = Arc::new(InstrumentedGateway::new(Duration::from_millis(1)));
    let synthesizer = Arc::new(SampleSynthesizer::new(gateway));
    let scheduler = Scheduler::new(synthesizer, SampleValidator::default(), 2)
        .expect("concurrency is positive");

    let report = scheduler.run(make_tasks(4), CancelToken::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.snapshot.succeeded_invalid, 4);
    assert_eq!(report.snapshot.failed, 0);
    assert_eq!(report.snapshot.validation_success_rate, 0.0);

    let invalid = report.invalid_samples();
    assert_eq!(invalid.len(), 4);
    assert!(invalid[0].1.iter().any(|r| r.contains("no tool invocation")));
}

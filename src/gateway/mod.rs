//! Model gateway abstraction for chat-style LLM requests.
//!
//! The pipeline talks to the model through the [`ModelGateway`] trait: send an
//! ordered list of role-tagged messages plus a sampling temperature, get back
//! the response text or a typed failure. Transient failures (rate limit,
//! server error, timeout) are retried inside the gateway with exponential
//! backoff; authentication failures propagate immediately so the caller can
//! abort the whole run.

mod openai;

pub use openai::OpenAiGateway;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for gateways that can answer chat-style requests.
///
/// Implementations guarantee at-least-one-attempt, eventually-resolving
/// behavior: transient errors are retried internally up to a bounded attempt
/// count before surfacing.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send a conversation to the model and return the response text.
    async fn send(&self, messages: &[Message], temperature: f64)
        -> Result<String, GatewayError>;
}

/// Retry policy for transient gateway failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-based), with uniform
    /// jitter so concurrent pipelines do not synchronize their retries
    /// against the upstream API.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
        let jitter_cap = (exp.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        exp + Duration::from_millis(jitter)
    }
}

/// Run `op` with the given retry policy, retrying only transient errors.
///
/// Used by gateway implementations to wrap a single HTTP round trip. The
/// attempt count passed to `op` is 0-based.
pub async fn with_retry<F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<String, GatewayError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<String, GatewayError>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying gateway request after transient failure"
            );
            tokio::time::sleep(delay).await;
        }

        match op(attempt).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                if err.is_transient() {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "Transient gateway error, will retry"
                    );
                    last_error = Some(err);
                } else {
                    return Err(err);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        GatewayError::MalformedResponse("Max retries exceeded with no error captured".to_string())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        let user = Message::user("Hello");
        assert_eq!(user.role, "user");

        let assistant = Message::assistant("Hi there!");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_retry_policy_delay_grows() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };

        // Jitter adds at most half the exponential delay, so the floor of
        // each attempt still dominates the previous attempt's floor.
        assert!(policy.delay_for(1) >= Duration::from_millis(100));
        assert!(policy.delay_for(2) >= Duration::from_millis(200));
        assert!(policy.delay_for(3) >= Duration::from_millis(400));
        assert!(policy.delay_for(3) < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_errors() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&fast_policy(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayError::ServerError {
                        code: 503,
                        message: "unavailable".into(),
                    })
                } else {
                    Ok("ok".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_attempts() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&fast_policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(GatewayError::Timeout("60s".into())) }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_authentication() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&fast_policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(GatewayError::Authentication("bad key".into())) }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

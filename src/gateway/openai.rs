//! OpenAI-compatible gateway implementation.
//!
//! Speaks the `/chat/completions` wire format used by OpenAI, OpenRouter,
//! LiteLLM and most self-hosted inference servers, so a single implementation
//! covers every backend the pipeline is pointed at.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

use super::{with_retry, Message, ModelGateway, RetryPolicy};

/// Request timeout in seconds. Individual calls are bounded here; the engine
/// imposes no additional per-task deadline.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Gateway for OpenAI-compatible chat completion APIs.
pub struct OpenAiGateway {
    /// HTTP client for making API requests.
    client: Client,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    api_base: String,
    /// API key for authentication.
    api_key: String,
    /// Model identifier sent with every request.
    model: String,
    /// Retry policy for transient failures.
    retry: RetryPolicy,
}

impl OpenAiGateway {
    /// Create a new gateway with the default retry policy.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the API, without the `/chat/completions` suffix
    /// * `api_key` - API key for bearer authentication
    /// * `model` - Model identifier (e.g., "gpt-4o-mini")
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_retry_policy(api_base, api_key, model, RetryPolicy::default())
    }

    /// Create a new gateway with an explicit retry policy.
    pub fn with_retry_policy(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client - system TLS configuration error"),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            retry,
        }
    }

    /// Get the base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the API key (for debugging, returns masked value).
    pub fn api_key_masked(&self) -> String {
        if self.api_key.len() <= 8 {
            "*".repeat(self.api_key.len())
        } else {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        }
    }

    /// Execute a single request (no retry logic).
    async fn execute_request(&self, request: &ApiRequest<'_>) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.api_base);

        let http_response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::ServerError {
                        code: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = match serde_json::from_str::<ApiErrorResponse>(&error_text) {
                Ok(parsed) => parsed.error.message,
                Err(_) => error_text,
            };

            return Err(match status_code {
                401 | 403 => GatewayError::Authentication(message),
                429 => GatewayError::RateLimited(message),
                408 | 504 => GatewayError::Timeout(message),
                code if code >= 500 => GatewayError::ServerError { code, message },
                code => GatewayError::MalformedResponse(format!(
                    "Unexpected status {}: {}",
                    code, message
                )),
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(GatewayError::MalformedResponse(
                "Response contained no content".to_string(),
            ));
        }

        Ok(content)
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn send(
        &self,
        messages: &[Message],
        temperature: f64,
    ) -> Result<String, GatewayError> {
        let request = ApiRequest {
            model: &self.model,
            messages,
            temperature,
        };

        with_retry(&self.retry, |_| self.execute_request(&request)).await
    }
}

/// Internal request structure for the OpenAI-compatible API.
#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
}

/// Internal response structure from the OpenAI-compatible API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: String,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_construction() {
        let gateway = OpenAiGateway::new("https://api.openai.com/v1/", "sk-test-1234", "gpt-4o");

        // Trailing slash is stripped so URL joining stays predictable
        assert_eq!(gateway.api_base(), "https://api.openai.com/v1");
        assert_eq!(gateway.model(), "gpt-4o");
    }

    #[test]
    fn test_api_key_masking() {
        let gateway = OpenAiGateway::new("http://localhost:4000", "sk-abcdefgh12345678", "m");
        let masked = gateway.api_key_masked();
        assert!(masked.starts_with("sk-a"));
        assert!(masked.ends_with("5678"));
        assert!(masked.contains("..."));

        let short = OpenAiGateway::new("http://localhost:4000", "key", "m");
        assert_eq!(short.api_key_masked(), "***");
    }

    #[test]
    fn test_api_request_serialization() {
        let messages = vec![Message::user("test")];
        let request = ApiRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.7,
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"gpt-4o\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[tokio::test]
    async fn test_send_connection_error_is_typed() {
        // Port that is unlikely to have a server listening
        let gateway = OpenAiGateway::with_retry_policy(
            "http://localhost:65535",
            "test-key",
            "gpt-4o",
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        );

        let result = gateway.send(&[Message::user("hello")], 0.7).await;
        assert!(matches!(
            result,
            Err(GatewayError::ServerError { .. }) | Err(GatewayError::Timeout(_))
        ));
    }
}

//! Error types for dpoforge operations.
//!
//! Defines error types for the major subsystems:
//! - Model gateway interactions (HTTP, retry classification)
//! - Sample synthesis
//! - The concurrent batch engine
//! - Dataset export

use thiserror::Error;

/// Errors returned by the model gateway.
///
/// The variants double as the retry classification: `RateLimited`,
/// `ServerError` and `Timeout` are transient and retried with backoff inside
/// the gateway, while `Authentication` and `MalformedResponse` propagate
/// immediately.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error ({code}): {message}")]
    ServerError { code: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Whether this error should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited(_)
                | GatewayError::ServerError { .. }
                | GatewayError::Timeout(_)
        )
    }
}

/// Errors that can occur while synthesizing a candidate sample.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A required generation step failed or produced unusable output.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The gateway rejected the request in a way retrying cannot fix.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SynthesisError {
    /// Whether this failure indicates a misconfigured API key rather than a
    /// per-task fault. The engine aborts the whole run on these.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            SynthesisError::Gateway(GatewayError::Authentication(_))
        )
    }
}

/// Errors that can occur during a batch run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Concurrency limit must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("Authentication failed, run aborted: {0}")]
    Authentication(String),
}

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No samples to export")]
    NoSamples,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

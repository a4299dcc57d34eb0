//! dpoforge: DPO preference-pair generator for tool-calling agents.
//!
//! This library generates chosen/rejected response pairs by prompting a
//! language model, validates the pairs, and exports them in batches for
//! preference optimization training.

// Core modules
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod gateway;
pub mod sample;
pub mod synthesizer;
pub mod tasks;
pub mod validator;

// Re-export commonly used error types
pub use error::{EngineError, ExportError, GatewayError, SynthesisError};

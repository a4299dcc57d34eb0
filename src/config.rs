//! Generation run configuration.
//!
//! Defaults can be overridden from `DPOFORGE_*` environment variables and by
//! CLI flags layered on top. The API key is required; everything else has a
//! sensible default.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    // Gateway settings
    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,
    /// API key for bearer authentication.
    pub api_key: String,
    /// Model identifier.
    pub model: String,

    // Batch settings
    /// Number of tasks to generate and run.
    pub num_tasks: usize,
    /// Maximum task pipelines holding an execution permit at once.
    pub concurrency: usize,
    /// Fraction (0.0-1.0) of tasks that are multi-turn.
    pub multi_turn_ratio: f64,
    /// Tools sampled into each task's tool set.
    pub tools_per_task: usize,
    /// Optional RNG seed for reproducible task sets.
    pub seed: Option<u64>,

    // Synthesis settings
    /// Run the self-evaluation call after each pair.
    pub self_evaluate: bool,
    /// Use the naive regenerate-hotter rejected strategy instead of the
    /// smart contrastive one.
    pub naive_rejected: bool,

    // Validation settings
    /// Require a tool invocation in the chosen response.
    pub require_chosen_invocation: bool,

    // Export settings
    /// Directory for exported files.
    pub output_dir: PathBuf,
    /// Samples per exported JSONL file.
    pub batch_size: usize,
    /// Dataset name used in `dataset_info.json`.
    pub dataset_name: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),

            num_tasks: 100,
            concurrency: 5,
            multi_turn_ratio: 0.3,
            tools_per_task: 3,
            seed: None,

            self_evaluate: false,
            naive_rejected: false,

            require_chosen_invocation: true,

            output_dir: PathBuf::from("./output"),
            batch_size: 1000,
            dataset_name: "tool_dpo_dataset".to_string(),
        }
    }
}

impl GenerationConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DPOFORGE_API_BASE`: API base URL (default: https://api.openai.com/v1)
    /// - `DPOFORGE_API_KEY`: API key (required)
    /// - `DPOFORGE_MODEL`: Model identifier (default: gpt-4o-mini)
    /// - `DPOFORGE_NUM_TASKS`: Tasks to run (default: 100)
    /// - `DPOFORGE_CONCURRENCY`: Concurrency limit (default: 5)
    /// - `DPOFORGE_MULTI_TURN_RATIO`: Multi-turn fraction (default: 0.3)
    /// - `DPOFORGE_TOOLS_PER_TASK`: Tool-set size (default: 3)
    /// - `DPOFORGE_SEED`: RNG seed for reproducible task sets
    /// - `DPOFORGE_SELF_EVALUATE`: Enable the self-evaluation call (default: false)
    /// - `DPOFORGE_NAIVE_REJECTED`: Use the naive rejected strategy (default: false)
    /// - `DPOFORGE_REQUIRE_CHOSEN_INVOCATION`: Require a tool call in chosen (default: true)
    /// - `DPOFORGE_OUTPUT_DIR`: Output directory (default: ./output)
    /// - `DPOFORGE_BATCH_SIZE`: Samples per JSONL file (default: 1000)
    /// - `DPOFORGE_DATASET_NAME`: Dataset name (default: tool_dpo_dataset)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have
    /// invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DPOFORGE_API_BASE") {
            config.api_base = val;
        }

        config.api_key = std::env::var("DPOFORGE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("DPOFORGE_API_KEY".to_string()))?;

        if let Ok(val) = std::env::var("DPOFORGE_MODEL") {
            config.model = val;
        }

        if let Ok(val) = std::env::var("DPOFORGE_NUM_TASKS") {
            config.num_tasks = parse_env_value(&val, "DPOFORGE_NUM_TASKS")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_CONCURRENCY") {
            config.concurrency = parse_env_value(&val, "DPOFORGE_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_MULTI_TURN_RATIO") {
            config.multi_turn_ratio = parse_env_value(&val, "DPOFORGE_MULTI_TURN_RATIO")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_TOOLS_PER_TASK") {
            config.tools_per_task = parse_env_value(&val, "DPOFORGE_TOOLS_PER_TASK")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_SEED") {
            config.seed = Some(parse_env_value(&val, "DPOFORGE_SEED")?);
        }

        if let Ok(val) = std::env::var("DPOFORGE_SELF_EVALUATE") {
            config.self_evaluate = parse_env_bool(&val, "DPOFORGE_SELF_EVALUATE")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_NAIVE_REJECTED") {
            config.naive_rejected = parse_env_bool(&val, "DPOFORGE_NAIVE_REJECTED")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_REQUIRE_CHOSEN_INVOCATION") {
            config.require_chosen_invocation =
                parse_env_bool(&val, "DPOFORGE_REQUIRE_CHOSEN_INVOCATION")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DPOFORGE_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "DPOFORGE_BATCH_SIZE")?;
        }

        if let Ok(val) = std::env::var("DPOFORGE_DATASET_NAME") {
            config.dataset_name = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_base cannot be empty".to_string(),
            ));
        }

        if self.api_key.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_key cannot be empty".to_string(),
            ));
        }

        if self.model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.multi_turn_ratio) {
            return Err(ConfigError::ValidationFailed(
                "multi_turn_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.tools_per_task == 0 {
            return Err(ConfigError::ValidationFailed(
                "tools_per_task must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.dataset_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "dataset_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the API credentials.
    pub fn with_api(
        mut self,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.api_key = api_key.into();
        self.model = model.into();
        self
    }

    /// Builder method to set the task count.
    pub fn with_num_tasks(mut self, n: usize) -> Self {
        self.num_tasks = n;
        self
    }

    /// Builder method to set the concurrency limit.
    pub fn with_concurrency(mut self, k: usize) -> Self {
        self.concurrency = k;
        self
    }

    /// Builder method to set the multi-turn ratio.
    pub fn with_multi_turn_ratio(mut self, ratio: f64) -> Self {
        self.multi_turn_ratio = ratio;
        self
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GenerationConfig {
        GenerationConfig::default().with_api("http://localhost:4000", "sk-test", "gpt-4o-mini")
    }

    #[test]
    fn test_default_config() {
        let config = GenerationConfig::default();
        assert_eq!(config.num_tasks, 100);
        assert_eq!(config.concurrency, 5);
        assert!((config.multi_turn_ratio - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.tools_per_task, 3);
        assert_eq!(config.batch_size, 1000);
        assert!(!config.self_evaluate);
        assert!(config.require_chosen_invocation);
    }

    #[test]
    fn test_config_builder() {
        let config = valid_config()
            .with_num_tasks(50)
            .with_concurrency(8)
            .with_multi_turn_ratio(0.5)
            .with_output_dir("/tmp/out");

        assert_eq!(config.num_tasks, 50);
        assert_eq!(config.concurrency, 8);
        assert!((config.multi_turn_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_api_key() {
        let config = GenerationConfig::default();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("api_key"));
    }

    #[test]
    fn test_validation_zero_concurrency() {
        let config = valid_config().with_concurrency(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("concurrency"));
    }

    #[test]
    fn test_validation_ratio_out_of_range() {
        let config = valid_config().with_multi_turn_ratio(1.5);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("multi_turn_ratio"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("DPOFORGE_API_KEY".to_string());
        assert!(err.to_string().contains("DPOFORGE_API_KEY"));

        let err = ConfigError::InvalidValue {
            key: "DPOFORGE_NUM_TASKS".to_string(),
            message: "could not parse 'abc'".to_string(),
        };
        assert!(err.to_string().contains("DPOFORGE_NUM_TASKS"));
    }
}

//! Kernel configuration: TOML file, environment overrides and validation.

pub mod types;

pub use types::{KernelConfig, LlmConfig, LlmProviderType, SequentialConfig, StepwiseConfig};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

const ENV_PREFIX: &str = "AGENTPLAN_";

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_var(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: format!("{}{}", ENV_PREFIX, name),
                value,
            }),
        None => Ok(None),
    }
}

fn list_env(name: &str) -> Option<Vec<String>> {
    env_var(name).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl KernelConfig {
    /// Create a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Create a configuration from defaults and `AGENTPLAN_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = KernelConfig::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields with any `AGENTPLAN_*` environment variables that are set
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(provider) = env_var("LLM_PROVIDER") {
            self.llm.provider_type = match provider.as_str() {
                "openai" => LlmProviderType::OpenAI,
                "openrouter" => {
                    if self.llm.base_url.is_none() && env_var("LLM_BASE_URL").is_none() {
                        self.llm.base_url = Some("https://openrouter.ai/api/v1".to_string());
                    }
                    LlmProviderType::OpenAI
                }
                "stub" => {
                    log::warn!("using stub completion provider (testing only)");
                    LlmProviderType::Stub
                }
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: format!("{}LLM_PROVIDER", ENV_PREFIX),
                        value: provider,
                    })
                }
            };
        }
        if let Some(model) = env_var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = env_var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = env_var("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(v) = parse_env("LLM_MAX_TOKENS")? {
            self.llm.max_tokens = Some(v);
        }
        if let Some(v) = parse_env("LLM_TEMPERATURE")? {
            self.llm.temperature = Some(v);
        }
        if let Some(v) = parse_env("LLM_TIMEOUT")? {
            self.llm.timeout_seconds = Some(v);
        }

        if let Some(v) = parse_env("STEPWISE_MAX_ITERATIONS")? {
            self.stepwise.max_iterations = v;
        }
        if let Some(v) = parse_env("STEPWISE_MIN_ITERATION_TIME_MS")? {
            self.stepwise.min_iteration_time_ms = v;
        }
        if let Some(v) = parse_env("STEPWISE_MAX_TOKENS")? {
            self.stepwise.max_tokens = v;
        }
        if let Some(v) = parse_env("STEPWISE_MAX_TOKENS_RATIO")? {
            self.stepwise.max_tokens_ratio = v;
        }
        if let Some(v) = list_env("STEPWISE_EXCLUDED_FUNCTIONS") {
            self.stepwise.excluded_functions = v;
        }

        if let Some(v) = parse_env("SEQUENTIAL_MAX_TOKENS")? {
            self.sequential.max_tokens = v;
        }
        if let Some(v) = parse_env("SEQUENTIAL_ALLOW_MISSING_FUNCTIONS")? {
            self.sequential.allow_missing_functions = v;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.llm.model.trim().is_empty() {
            errors.push("LLM model must not be empty".to_string());
        }
        if let Some(temp) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temp) {
                errors.push("LLM temperature must be between 0.0 and 2.0".to_string());
            }
        }
        if self.llm.max_tokens == Some(0) {
            errors.push("LLM max_tokens must be greater than 0".to_string());
        }
        if self.llm.provider_type == LlmProviderType::OpenAI && self.llm.api_key.is_none() {
            errors.push("OpenAI provider requires an api_key".to_string());
        }

        let stepwise = &self.stepwise;
        if stepwise.max_iterations == 0 {
            errors.push("stepwise max_iterations must be greater than 0".to_string());
        }
        if !(stepwise.max_tokens_ratio > 0.0 && stepwise.max_tokens_ratio < 1.0) {
            errors.push("stepwise max_tokens_ratio must be between 0.0 and 1.0 (exclusive)".to_string());
        }
        if stepwise.max_completion_tokens() == 0 || stepwise.max_prompt_tokens() == 0 {
            errors.push("stepwise max_tokens is too small for the configured ratio".to_string());
        }

        if self.sequential.max_tokens == 0 {
            errors.push("sequential max_tokens must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

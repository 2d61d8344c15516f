use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`crate::Kernel`] and its planners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub stepwise: StepwiseConfig,
    #[serde(default)]
    pub sequential: SequentialConfig,
}

/// Completion provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    /// Deterministic scripted replies (testing only)
    Stub,
    /// OpenAI-compatible chat completions API (OpenAI, OpenRouter, local gateways)
    #[serde(alias = "openrouter")]
    OpenAI,
}

/// Completion provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider_type: LlmProviderType,
    /// Model name/identifier
    pub model: String,
    /// API key (can be loaded from env)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL for API (optional, for custom endpoints)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Maximum tokens per completion
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Temperature for generation (0.0 = deterministic, 2.0 = most random)
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_type: LlmProviderType::Stub,
            model: "stub-model".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            timeout_seconds: Some(60),
        }
    }
}

/// Stepwise (ReAct) planner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepwiseConfig {
    /// Upper bound on model calls per session
    pub max_iterations: usize,
    /// Minimum delay between two model calls, in milliseconds
    pub min_iteration_time_ms: u64,
    /// Total token budget shared by prompt and completion
    pub max_tokens: usize,
    /// Share of `max_tokens` reserved for the completion
    pub max_tokens_ratio: f64,
    pub excluded_plugins: Vec<String>,
    pub excluded_functions: Vec<String>,
    /// When non-empty, only these functions (`plugin.name`) are offered
    pub included_functions: Vec<String>,
    /// Extra instructions appended to the system prompt
    pub suffix: Option<String>,
}

impl Default for StepwiseConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            min_iteration_time_ms: 0,
            max_tokens: 4000,
            max_tokens_ratio: 0.1,
            excluded_plugins: vec![],
            excluded_functions: vec![],
            included_functions: vec![],
            suffix: None,
        }
    }
}

impl StepwiseConfig {
    pub fn max_completion_tokens(&self) -> usize {
        (self.max_tokens as f64 * self.max_tokens_ratio) as usize
    }

    pub fn max_prompt_tokens(&self) -> usize {
        (self.max_tokens as f64 * (1.0 - self.max_tokens_ratio)) as usize
    }
}

/// Sequential (XML plan) planner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialConfig {
    /// Completion budget for the plan document
    pub max_tokens: u32,
    pub excluded_plugins: Vec<String>,
    pub excluded_functions: Vec<String>,
    pub included_functions: Vec<String>,
    /// Keep steps naming unknown functions instead of failing the parse
    pub allow_missing_functions: bool,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            excluded_plugins: vec![],
            excluded_functions: vec![],
            included_functions: vec![],
            allow_missing_functions: false,
        }
    }
}

//! OpenAI-compatible `/chat/completions` client (OpenAI, OpenRouter, local gateways).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{
    ChatHistory, CompletionClient, CompletionClientInfo, CompletionError, CompletionSettings,
};
use crate::config::LlmConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ERROR_PREVIEW_CHARS: usize = 1000;

pub struct OpenAiCompletionClient {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompletionClient {
    pub fn new(config: LlmConfig) -> Result<Self, CompletionError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            CompletionError::Configuration("API key required for OpenAI provider".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.timeout_seconds.unwrap_or(30),
            ))
            .build()
            .map_err(|e| {
                CompletionError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    async fn make_request(
        &self,
        messages: Vec<OpenAIMessage>,
        settings: &CompletionSettings,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url());
        let request_body = OpenAIRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: settings.max_tokens.or(self.config.max_tokens),
            temperature: settings.temperature.or(self.config.temperature),
            stop: if settings.stop_sequences.is_empty() {
                None
            } else {
                Some(settings.stop_sequences.clone())
            },
        };

        let mut request_builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body);

        if self.base_url().contains("openrouter.ai") {
            let referer = std::env::var("OPENROUTER_HTTP_REFERER")
                .unwrap_or_else(|_| "https://github.com/agentplan/agentplan".to_string());
            let title = std::env::var("OPENROUTER_TITLE").unwrap_or_else(|_| "agentplan".to_string());
            request_builder = request_builder
                .header("HTTP-Referer", referer)
                .header("X-Title", title);
        }

        log::debug!("POST {} (model {})", url, self.config.model);
        let response = request_builder
            .send()
            .await
            .map_err(|e| CompletionError::Request(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response
            .text()
            .await
            .map_err(|e| CompletionError::Request(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let body = if raw_body.chars().count() > ERROR_PREVIEW_CHARS {
                let preview: String = raw_body.chars().take(ERROR_PREVIEW_CHARS).collect();
                format!("{}...[truncated, total length: {} bytes]", preview, raw_body.len())
            } else {
                raw_body
            };
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OpenAIResponse = serde_json::from_str(&raw_body)
            .map_err(|e| CompletionError::Decode(format!("{} in body: {}", e, raw_body)))?;

        if let Some(usage) = &parsed.usage {
            log::debug!(
                "completion usage: prompt={:?} completion={:?} total={:?}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::NoResponse)?;
        if let Some(reason) = &choice.finish_reason {
            if reason == "length" {
                log::warn!("completion truncated by max_tokens");
            }
        }
        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(CompletionError::NoResponse),
        }
    }

    async fn cancellable(
        &self,
        messages: Vec<OpenAIMessage>,
        settings: &CompletionSettings,
        cancellation: &CancellationToken,
    ) -> Result<String, CompletionError> {
        tokio::select! {
            _ = cancellation.cancelled() => Err(CompletionError::Cancelled),
            result = self.make_request(messages, settings) => result,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete_text(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
        cancellation: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let messages = vec![OpenAIMessage {
            role: "user".to_string(),
            content: Some(prompt.to_string()),
        }];
        self.cancellable(messages, settings, cancellation).await
    }

    async fn complete_chat(
        &self,
        history: &ChatHistory,
        settings: &CompletionSettings,
        cancellation: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let messages = history
            .messages()
            .iter()
            .map(|m| OpenAIMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
            })
            .collect();
        self.cancellable(messages, settings, cancellation).await
    }

    fn info(&self) -> CompletionClientInfo {
        CompletionClientInfo {
            name: "openai".to_string(),
            model: self.config.model.clone(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProviderType;

    #[test]
    fn test_request_serialization_skips_unset_fields() {
        let request = OpenAIRequest {
            model: "gpt-test".to_string(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: Some("hi".to_string()),
            }],
            max_tokens: None,
            temperature: Some(0.0),
            stop: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-test",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.0
            })
        );
    }

    #[test]
    fn test_response_with_null_content_parses() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#;
        let parsed: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn test_base_url_defaults_and_trims() {
        let mut config = LlmConfig {
            provider_type: LlmProviderType::OpenAI,
            api_key: Some("k".to_string()),
            ..LlmConfig::default()
        };
        let client = OpenAiCompletionClient::new(config.clone()).unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);

        config.base_url = Some("http://localhost:8080/v1/".to_string());
        let client = OpenAiCompletionClient::new(config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }
}

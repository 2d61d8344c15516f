//! Completion clients: the boundary to the language model.

mod openai;
mod stub;

pub use openai::OpenAiCompletionClient;
pub use stub::{RecordedRequest, ScriptedCompletionClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{LlmConfig, LlmProviderType};

#[derive(Debug, Error)]
pub enum CompletionError {
    /// The model returned no usable choice.
    #[error("the model returned no response")]
    NoResponse,
    #[error("request failed: {0}")]
    Request(String),
    #[error("API error (HTTP {status}): {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("completion cancelled")]
    Cancelled,
    #[error("invalid completion client configuration: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    System,
    User,
    Assistant,
}

impl AuthorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorRole::System => "system",
            AuthorRole::User => "user",
            AuthorRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: AuthorRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: AuthorRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered chat transcript sent to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(content: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.add_system(content);
        history
    }

    pub fn add(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn add_system(&mut self, content: impl Into<String>) {
        self.add(ChatMessage::new(AuthorRole::System, content));
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.add(ChatMessage::new(AuthorRole::User, content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.add(ChatMessage::new(AuthorRole::Assistant, content));
    }

    pub fn insert(&mut self, index: usize, message: ChatMessage) {
        let index = index.min(self.messages.len());
        self.messages.insert(index, message);
    }

    pub fn remove(&mut self, index: usize) -> Option<ChatMessage> {
        if index < self.messages.len() {
            Some(self.messages.remove(index))
        } else {
            None
        }
    }

    pub fn pop(&mut self) -> Option<ChatMessage> {
        self.messages.pop()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl fmt::Display for ChatHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{}: {}", message.role.as_str(), message.content)?;
        }
        Ok(())
    }
}

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl CompletionSettings {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }
}

/// Information about a completion client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionClientInfo {
    pub name: String,
    pub model: String,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Completes a single text prompt.
    async fn complete_text(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
        cancellation: &CancellationToken,
    ) -> Result<String, CompletionError>;

    /// Produces the next assistant message for a chat transcript.
    async fn complete_chat(
        &self,
        history: &ChatHistory,
        settings: &CompletionSettings,
        cancellation: &CancellationToken,
    ) -> Result<String, CompletionError>;

    fn info(&self) -> CompletionClientInfo;
}

/// Factory for creating completion clients from configuration
pub struct CompletionClientFactory;

impl CompletionClientFactory {
    pub fn create(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>, CompletionError> {
        match config.provider_type {
            LlmProviderType::Stub => Ok(Arc::new(ScriptedCompletionClient::echo())),
            LlmProviderType::OpenAI => Ok(Arc::new(OpenAiCompletionClient::new(config.clone())?)),
        }
    }
}

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::{
    ChatHistory, CompletionClient, CompletionClientInfo, CompletionError,
    CompletionSettings,
};

/// A request seen by [`ScriptedCompletionClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Text(String),
    Chat(ChatHistory),
}

impl RecordedRequest {
    /// Text of the prompt, or of the last message for chat requests.
    pub fn last_text(&self) -> &str {
        match self {
            RecordedRequest::Text(prompt) => prompt,
            RecordedRequest::Chat(history) => history
                .last()
                .map(|m| m.content.as_str())
                .unwrap_or(""),
        }
    }
}

/// Deterministic completion client replaying scripted replies in order.
///
/// When the script runs out it repeats the fallback reply, or echoes the
/// prompt in echo mode, or fails with [`CompletionError::NoResponse`].
#[derive(Debug, Default)]
pub struct ScriptedCompletionClient {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    echo: bool,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedCompletionClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Client that answers every request with its own prompt.
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(reply.into());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_reply(&self, request: RecordedRequest) -> Result<String, CompletionError> {
        let echoed = request.last_text().to_string();
        lock(&self.requests).push(request);
        if let Some(reply) = lock(&self.replies).pop_front() {
            return Ok(reply);
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }
        if self.echo {
            return Ok(echoed);
        }
        Err(CompletionError::NoResponse)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete_text(
        &self,
        prompt: &str,
        _settings: &CompletionSettings,
        cancellation: &CancellationToken,
    ) -> Result<String, CompletionError> {
        if cancellation.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }
        self.next_reply(RecordedRequest::Text(prompt.to_string()))
    }

    async fn complete_chat(
        &self,
        history: &ChatHistory,
        _settings: &CompletionSettings,
        cancellation: &CancellationToken,
    ) -> Result<String, CompletionError> {
        if cancellation.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }
        self.next_reply(RecordedRequest::Chat(history.clone()))
    }

    fn info(&self) -> CompletionClientInfo {
        CompletionClientInfo {
            name: "stub".to_string(),
            model: "stub-model".to_string(),
        }
    }
}

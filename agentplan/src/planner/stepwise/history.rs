//! Keeps the chat transcript inside the prompt token budget.

use crate::completion::{AuthorRole, ChatHistory, ChatMessage};

use super::parser::{OBSERVATION_MARKER, THOUGHT_MARKER};

/// Rough token estimate: four characters per token, at least one per message.
pub fn estimate_message_tokens(content: &str) -> usize {
    (content.chars().count() / 4).max(1)
}

pub fn estimate_tokens(history: &ChatHistory) -> usize {
    history
        .messages()
        .iter()
        .map(|m| estimate_message_tokens(&m.content))
        .sum()
}

fn trim_notice(removed: usize) -> String {
    format!("[{} earlier messages trimmed]", removed)
}

/// Transcript to send when `history` would exceed `budget` tokens.
///
/// Messages after the first `protected` ones (system prompt and question) are
/// dropped oldest first, never touching the latest observation or anything
/// after it. Dropped messages are replaced by a notice of how many messages
/// were removed, preceded by the first thought of the session when its
/// message was among them. Returns the estimated size
/// as the error when the budget cannot be met.
pub fn fit_history(
    history: &ChatHistory,
    first_thought: Option<&str>,
    protected: usize,
    budget: usize,
) -> Result<ChatHistory, usize> {
    let total = estimate_tokens(history);
    if total < budget {
        return Ok(history.clone());
    }

    let messages = history.messages();
    let protected = protected.min(messages.len());
    let keep_from = messages
        .iter()
        .rposition(|m| m.role == AuthorRole::User && m.content.starts_with(OBSERVATION_MARKER))
        .filter(|&i| i >= protected)
        .unwrap_or_else(|| messages.len().saturating_sub(1).max(protected));

    let first_thought = first_thought.filter(|t| !t.trim().is_empty());
    // index of the message that carried the first thought
    let carrier = first_thought.and_then(|thought| {
        messages
            .iter()
            .skip(protected)
            .position(|m| m.role == AuthorRole::Assistant && m.content.contains(thought))
            .map(|i| i + protected)
    });
    let first_thought = first_thought.map(|t| format!("{} {}", THOUGHT_MARKER, t));
    let restores_thought =
        |removed: usize| carrier.map_or(false, |i| i < protected + removed);

    let mut removed = 0;
    let mut tokens = total;
    while tokens >= budget && protected + removed < keep_from {
        removed += 1;
        let dropped: usize = messages[protected..protected + removed]
            .iter()
            .map(|m| estimate_message_tokens(&m.content))
            .sum();
        let mut inserted = estimate_message_tokens(&trim_notice(removed));
        if restores_thought(removed) {
            inserted += first_thought.as_deref().map(estimate_message_tokens).unwrap_or(0);
        }
        tokens = total - dropped + inserted;
    }

    if tokens >= budget {
        return Err(tokens);
    }
    if removed == 0 {
        return Ok(history.clone());
    }

    log::info!(
        "trimmed {} messages from the transcript ({} -> {} tokens)",
        removed,
        total,
        tokens
    );

    let mut reduced = ChatHistory::new();
    for message in &messages[..protected] {
        reduced.add(message.clone());
    }
    if let Some(thought) = first_thought.filter(|_| restores_thought(removed)) {
        reduced.add(ChatMessage::new(AuthorRole::Assistant, thought));
    }
    reduced.add(ChatMessage::new(AuthorRole::Assistant, trim_notice(removed)));
    for message in &messages[protected + removed..] {
        reduced.add(message.clone());
    }
    Ok(reduced)
}

//! Parsing of model replies in the `[THOUGHT]`/`[ACTION]`/`[FINAL ANSWER]` protocol.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::types::{DiagnosticKind, StepDiagnostic, SystemStep};

pub const THOUGHT_MARKER: &str = "[THOUGHT]";
pub const ACTION_MARKER: &str = "[ACTION]";
pub const OBSERVATION_MARKER: &str = "[OBSERVATION]";
pub const FINAL_ANSWER_MARKER: &str = "[FINAL ANSWER]";

static FINAL_ANSWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\[FINAL[_\s\-]?ANSWER\](?P<answer>.+)").unwrap());
static THOUGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*(?:\[THOUGHT\])?(?P<thought>.*?)\s*(?:\[ACTION\]|$)").unwrap()
});
static ACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[ACTION\]").unwrap());
static OBSERVATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[OBSERVATION\]").unwrap());
static INNER_THOUGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[THOUGHT\]").unwrap());

#[derive(Debug, Deserialize)]
struct ActionBlob {
    #[serde(default)]
    action: String,
    #[serde(default)]
    action_variables: Option<serde_json::Map<String, Value>>,
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn diagnostic(kind: DiagnosticKind, message: impl Into<String>, partial: SystemStep) -> StepDiagnostic {
    StepDiagnostic {
        kind,
        message: message.into(),
        partial,
    }
}

/// Parses one model reply into a step.
///
/// A final answer wins over everything else. Anything after a model-written
/// `[OBSERVATION]` is discarded, since observations come from the planner.
pub fn parse_step(reply: &str) -> Result<SystemStep, StepDiagnostic> {
    let mut step = SystemStep {
        original_response: reply.to_string(),
        ..SystemStep::default()
    };

    if let Some(captures) = FINAL_ANSWER.captures(reply) {
        let answer = captures["answer"].trim();
        if !answer.is_empty() {
            step.final_answer = answer.to_string();
            return Ok(step);
        }
    }

    let text = match OBSERVATION.find(reply) {
        Some(m) => &reply[..m.start()],
        None => reply,
    };

    let thought = THOUGHT
        .captures(text)
        .and_then(|c| c.name("thought"))
        .map(|m| m.as_str())
        .unwrap_or("");
    let thought = match INNER_THOUGHT.find_iter(thought).last() {
        Some(m) => &thought[m.end()..],
        None => thought,
    };
    step.thought = thought.trim().to_string();

    let Some(marker) = ACTION.find(text) else {
        if step.thought.is_empty() {
            return Err(diagnostic(
                DiagnosticKind::MissingThoughtAndAction,
                "The reply contained neither a [THOUGHT] nor an [ACTION].",
                step,
            ));
        }
        return Ok(step);
    };

    let after = &text[marker.end()..];
    let json = match (after.find('{'), after.rfind('}')) {
        (Some(start), Some(end)) if end > start => &after[start..=end],
        _ => {
            return Err(diagnostic(
                DiagnosticKind::MissingActionJson,
                "No action JSON object was found after [ACTION]. Provide a single JSON object with \"action\" and \"action_variables\".",
                step,
            ))
        }
    };

    let blob: ActionBlob = match serde_json::from_str(json) {
        Ok(blob) => blob,
        Err(e) => {
            return Err(diagnostic(
                DiagnosticKind::InvalidActionJson,
                format!(
                    "The action JSON could not be parsed ({}). Provide a single valid JSON object with \"action\" and \"action_variables\".",
                    e
                ),
                step,
            ))
        }
    };

    step.action = blob.action.trim().to_string();
    step.action_variables = blob
        .action_variables
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, stringify(v)))
        .collect::<IndexMap<_, _>>();

    if !step.has_action() && step.thought.is_empty() {
        return Err(diagnostic(
            DiagnosticKind::MissingThoughtAndAction,
            "The action JSON did not name an action and no [THOUGHT] was given.",
            step,
        ));
    }
    Ok(step)
}
